use std::sync::Arc;

use crate::{
    config::Config,
    identity::IdentityProvider,
    middleware::policy::RoutePolicy,
    repositories::profile::ProfileStore,
    utils::cookies::CookieOptions,
};

/// Everything the request gate needs, shared immutably across requests.
#[derive(Clone)]
pub struct GateState {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub policy: Arc<RoutePolicy>,
    pub cookie_options: CookieOptions,
}

impl GateState {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        policy: RoutePolicy,
        cookie_options: CookieOptions,
    ) -> Self {
        Self {
            identity,
            profiles,
            policy: Arc::new(policy),
            cookie_options,
        }
    }

    pub fn from_config(
        config: &Config,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self::new(
            identity,
            profiles,
            config.policy.clone(),
            config.session_cookies.options,
        )
    }
}
