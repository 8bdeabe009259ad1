//! Shared application state, built once in `main` and handed out as `Arc`.

use std::sync::Arc;

use crate::config::Config;
use crate::delivery::Dispatcher;
use crate::feed::FeedFetcher;
use crate::storage::{KeySpace, KvStore, SubscriptionStore};
use crate::transport::MessagingTransport;

pub struct AppContext {
    pub config: Config,
    pub store: SubscriptionStore,
    pub fetcher: Arc<dyn FeedFetcher>,
    pub transport: Arc<dyn MessagingTransport>,
}

impl AppContext {
    pub fn new(
        config: Config,
        kv: Arc<dyn KvStore>,
        fetcher: Arc<dyn FeedFetcher>,
        transport: Arc<dyn MessagingTransport>,
    ) -> Self {
        let store = SubscriptionStore::new(kv, KeySpace::new(config.key_prefix.clone()));
        Self {
            config,
            store,
            fetcher,
            transport,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.store.clone(), self.transport.clone())
    }
}
