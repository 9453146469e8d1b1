use crate::backup::result_error::result::Result;
use std::fmt::Display;

pub mod smtp;

/// Something able to deliver a message with a subject line.
pub trait Notification {
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()>;
}
