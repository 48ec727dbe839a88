//! Per-tenant service-user credentials issued to this microservice.

use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceUser {
    pub tenant: String,
    pub name: String,
    pub password: Secret<String>,
}

impl ServiceUser {
    /// Basic-auth login, qualified with the tenant.
    pub fn login(&self) -> String {
        format!("{}/{}", self.tenant, self.name)
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Payload of the subscriptions endpoint.
#[derive(Debug, Deserialize)]
pub struct Subscriptions {
    #[serde(default)]
    pub users: Vec<ServiceUser>,
}

/// Eventually-consistent view of the platform's service users.
///
/// Shared by all requests; a refresh may land between any two reads.
#[derive(Debug, Default)]
pub struct ServiceUserCache {
    users: DashMap<String, ServiceUser>,
}

impl ServiceUserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant: &str) -> Option<ServiceUser> {
        self.users.get(tenant).map(|entry| entry.value().clone())
    }

    /// Swap in a freshly fetched set.
    ///
    /// New entries are written before stale tenants are dropped so a
    /// concurrent reader never sees a tenant vanish and reappear.
    pub fn replace(&self, users: Vec<ServiceUser>) -> usize {
        let tenants: HashSet<String> = users.iter().map(|u| u.tenant.clone()).collect();
        for user in users {
            self.users.insert(user.tenant.clone(), user);
        }
        self.users.retain(|tenant, _| tenants.contains(tenant));
        self.users.len()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(tenant: &str, name: &str) -> ServiceUser {
        ServiceUser {
            tenant: tenant.to_string(),
            name: name.to_string(),
            password: Secret::new(format!("{name}-pw")),
        }
    }

    #[test]
    fn replace_drops_tenants_missing_from_new_set() {
        let cache = ServiceUserCache::new();
        cache.replace(vec![user("t1", "svc_a"), user("t2", "svc_b")]);
        assert_eq!(cache.len(), 2);

        let remaining = cache.replace(vec![user("t2", "svc_c")]);
        assert_eq!(remaining, 1);
        assert!(cache.get("t1").is_none());
        assert_eq!(cache.get("t2").unwrap().name, "svc_c");
    }

    #[test]
    fn login_is_tenant_qualified() {
        let u = user("t100", "service_devicecert");
        assert_eq!(u.login(), "t100/service_devicecert");
        assert_eq!(u.password(), "service_devicecert-pw");
    }

    #[test]
    fn subscriptions_tolerate_missing_users() {
        let subs: Subscriptions = serde_json::from_str("{}").unwrap();
        assert!(subs.users.is_empty());

        let subs: Subscriptions = serde_json::from_str(
            r#"{"users":[{"tenant":"t1","name":"svc","password":"pw"}]}"#,
        )
        .unwrap();
        assert_eq!(subs.users[0].login(), "t1/svc");
    }
}
