//! Transport implementations.

pub mod http;

#[cfg(feature = "mock")]
pub mod mock;

/// Registers all compiled transports with the factory.
///
/// This should be called automatically when the library is used,
/// but can also be called explicitly if needed.
pub fn register_all() {
    http::register();

    #[cfg(feature = "mock")]
    mock::register();
}
