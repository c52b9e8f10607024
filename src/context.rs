//! Process-wide providers.
//!
//! A page exposes one `ethereum` provider and one legacy `web3` provider.
//! [`init`] builds both on a shared port exactly once; later calls hand back
//! the same pair.
use std::sync::{Arc, OnceLock};

use crate::legacy::LegacyProvider;
use crate::options::ProviderOptions;
use crate::port::MessagePort;
use crate::provider::Provider;

#[derive(Debug)]
pub struct Web3 {
    pub current_provider: LegacyProvider,
}

#[derive(Debug)]
pub struct Context {
    pub ethereum: Provider,
    pub web3: Web3,
}

static CONTEXT: OnceLock<Context> = OnceLock::new();

/// Creates the process-wide providers. Must run inside a tokio runtime the
/// first time; `port` and `options` are ignored once initialized.
pub fn init(port: Arc<dyn MessagePort>, options: ProviderOptions) -> &'static Context {
    CONTEXT.get_or_init(|| {
        tracing::info!("initializing providers");
        Context {
            ethereum: Provider::new(port.clone(), options.clone()),
            web3: Web3 {
                current_provider: LegacyProvider::new(port, options),
            },
        }
    })
}

pub fn get() -> Option<&'static Context> {
    CONTEXT.get()
}
