//! Human-in-the-loop approval requests.

mod gateway;
mod sweeper;

pub use gateway::{HitlGateway, Resolution};
pub use sweeper::ExpirySweeper;
