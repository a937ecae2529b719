//! Authentication state trait.

use super::service::TokenService;

/// Trait for router state types that expose the token service, so extractors
/// can authenticate against any state that carries one.
pub trait HasAuthBackend {
    fn tokens(&self) -> &TokenService;
}
