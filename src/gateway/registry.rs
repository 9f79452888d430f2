use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use anyhow::anyhow;

pub const RESERVATION_SERVICE: &str = "reservation-service";

struct Instances {
    base_urls: Vec<String>,
    cursor: AtomicUsize,
}

/// Static router table: service id to the base URLs of its instances,
/// picked round-robin.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Instances>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I, S>(mut self, service_id: &str, base_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let base_urls = base_urls
            .into_iter()
            .map(|url| url.into().trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .collect();

        self.services.insert(
            service_id.to_string(),
            Instances { base_urls, cursor: AtomicUsize::new(0) },
        );
        self
    }

    pub fn choose(&self, service_id: &str) -> anyhow::Result<&str> {
        let instances = self
            .services
            .get(service_id)
            .ok_or_else(|| anyhow!("No route registered for service: {}", service_id))?;

        if instances.base_urls.is_empty() {
            return Err(anyhow!("No instances available for service: {}", service_id));
        }

        let next = instances.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(&instances.base_urls[next % instances.base_urls.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robins_across_instances() {
        let registry = ServiceRegistry::new()
            .register(RESERVATION_SERVICE, ["http://a:8000/", "http://b:8000"]);

        let picks: Vec<_> = (0..4)
            .map(|_| registry.choose(RESERVATION_SERVICE).unwrap().to_string())
            .collect();

        assert_eq!(picks, ["http://a:8000", "http://b:8000", "http://a:8000", "http://b:8000"]);
    }

    #[test]
    fn unknown_or_empty_service_is_an_error() {
        let registry = ServiceRegistry::new().register(RESERVATION_SERVICE, Vec::<String>::new());

        assert!(registry.choose(RESERVATION_SERVICE).is_err());
        assert!(registry.choose("billing-service").is_err());
    }
}
