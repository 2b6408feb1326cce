// Communication channels lock-free

use crate::messaging::command::AudioCommand;
use crate::messaging::update::VisualUpdate;
use ringbuf::{HeapRb, traits::Split};

pub type CommandProducer = ringbuf::HeapProd<AudioCommand>;
pub type CommandConsumer = ringbuf::HeapCons<AudioCommand>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<AudioCommand>::new(capacity);
    rb.split()
}

pub type UpdateProducer = ringbuf::HeapProd<VisualUpdate>;
pub type UpdateConsumer = ringbuf::HeapCons<VisualUpdate>;

pub fn create_update_channel(capacity: usize) -> (UpdateProducer, UpdateConsumer) {
    let rb = HeapRb::<VisualUpdate>::new(capacity);
    rb.split()
}
