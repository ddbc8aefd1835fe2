//! Context refresh dispatch
//!
//! Hosts expose one of two refresh entry points. The signature is looked up once
//! per dispatcher and reused for every later refresh.

use std::sync::OnceLock;

use hotswap_kernel::{HostResult, RefreshSignature, WebBridge};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct RefreshDispatcher {
    signature: OnceLock<RefreshSignature>,
}

impl RefreshDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached signature, if a refresh has been dispatched already.
    pub fn signature(&self) -> Option<RefreshSignature> {
        self.signature.get().copied()
    }

    /// Refresh the web context through whichever entry point the host has.
    pub async fn refresh(&self, web: &dyn WebBridge) -> HostResult<RefreshSignature> {
        let signature = *self.signature.get_or_init(|| {
            let detected = web.refresh_signature();
            debug!("Detected context refresh signature: {:?}", detected);
            detected
        });

        info!("Refreshing web application context");
        match signature {
            RefreshSignature::Standard => web.refresh().await?,
            RefreshSignature::Compat => web.refresh_compat(true, None).await?,
        }

        Ok(signature)
    }
}
