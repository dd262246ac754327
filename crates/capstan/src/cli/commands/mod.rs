//! CLI commands

mod gpg_sign;
mod notarize;
mod package;
mod publish;
mod upload;

pub use gpg_sign::GpgSignCommand;
pub use notarize::NotarizeCommand;
pub use package::PackageCommand;
pub use publish::PublishCommand;
pub use upload::UploadCommand;
