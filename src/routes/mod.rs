mod admin;
mod contact;
mod health_check;
mod subscriptions;
mod subscriptions_confirm;
mod tracking;
mod unsubscribe;

pub use admin::*;
pub use contact::*;
pub use health_check::*;
pub use subscriptions::*;
pub use subscriptions_confirm::*;
pub use tracking::*;
pub use unsubscribe::*;

/// Writes an error followed by every error in its `source` chain.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
