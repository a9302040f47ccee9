pub mod client;

pub use client::{DisabledMailer, HttpMailer, MailerError, SendEmailRequest};
