// Messaging module - lock-free channels between scheduler, audio and UI

pub mod channels;
pub mod command;
pub mod update;

pub use channels::{
    CommandConsumer, CommandProducer, UpdateConsumer, UpdateProducer, create_command_channel,
    create_update_channel,
};
pub use command::AudioCommand;
pub use update::VisualUpdate;
