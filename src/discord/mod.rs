mod gateway;
mod rest;

pub use gateway::{GatewayHandler, connect};
pub use rest::DiscordRestClient;
