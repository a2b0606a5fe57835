mod network_tests;
mod pool_tests;
mod storage_tests;
mod vm_tests;

use crate::{ApiClient, ConnectionOptions, Credentials};
use std::sync::Arc;

/// A token-authenticated client against a wiremock server; root so the
/// authorisation validator stays out of the way unless a test opts in.
pub fn test_client(uri: &str) -> Arc<ApiClient> {
    let options = ConnectionOptions::new(
        uri,
        Credentials::Token("root@pam!tf=00000000-0000-0000-0000-000000000000".to_string()),
    )
    .unwrap();
    Arc::new(ApiClient::new(options).unwrap())
}

/// Same client under a non-root token.
pub fn non_root_client(uri: &str) -> Arc<ApiClient> {
    let options = ConnectionOptions::new(
        uri,
        Credentials::Token("automation@pve!tf=00000000-0000-0000-0000-000000000000".to_string()),
    )
    .unwrap();
    Arc::new(ApiClient::new(options).unwrap())
}
