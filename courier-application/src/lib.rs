pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod context;
pub mod dto;
pub mod error;
pub mod inmemory_command_bus;
pub mod send_sms;

pub use inmemory_command_bus::InMemoryCommandBus;
pub use send_sms::{SendSms, SendSmsHandler};
