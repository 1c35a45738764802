//! Collaborators handed to task bodies: secrets, notifications, and external commands.

pub mod command;
pub mod notify;
pub mod secrets;

pub use command::{CommandOutput, CommandRequest, CommandRunner, TokioCommandRunner};
pub use notify::{LogSink, MemorySink, Notification, NotificationSink, WebhookSink};
pub use secrets::{EnvSecrets, SecretsProvider, StaticSecrets};
