use std::sync::Arc;

use crate::cipher::SecretCipher;
use crate::client::ProtocolClient;

/// Shared state for the route handler.
#[derive(Clone)]
pub(super) struct RouteState {
    pub(super) client: Arc<ProtocolClient>,
    pub(super) cipher: Arc<SecretCipher>,
}
