//! API key → tenant database resolution

use std::collections::HashMap;

use crate::config::TenantConfig;

/// A resolved tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub name: String,
    pub database: String,
}

#[derive(Debug, Clone, Default)]
pub struct TenantDirectory {
    by_key: HashMap<String, Tenant>,
}

impl TenantDirectory {
    pub fn from_config(tenants: &[TenantConfig]) -> Self {
        let mut by_key = HashMap::new();
        for tenant in tenants {
            let resolved = Tenant {
                name: tenant.name.clone(),
                database: tenant.database.clone(),
            };
            for key in &tenant.api_keys {
                by_key.insert(key.clone(), resolved.clone());
            }
        }
        Self { by_key }
    }

    pub fn resolve(&self, api_key: &str) -> Option<&Tenant> {
        self.by_key.get(api_key)
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
