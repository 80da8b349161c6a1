// crates/core/src/route.rs
//! Route/completion entries mapped into ordered service lists, with
//! optional resolution of service names into registered [`Service`]
//! entities through a [`ServiceDirectory`].

use async_trait::async_trait;

use crate::types::{JobEvent, Service};

/// Name-to-entity lookup seam. `jobtrail-db` implements this over the
/// service registry table; tests stub it with a map.
#[async_trait]
pub trait ServiceDirectory {
    type Error;

    /// Look up one service by exact name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Service>, Self::Error>;
}

/// Resolve names through the directory, preserving input order.
///
/// Names the directory does not know are silently dropped — a route may
/// reference services not yet registered. Directory failures propagate.
pub async fn resolve_service_names<D>(
    directory: &D,
    names: &[String],
) -> Result<Vec<Service>, D::Error>
where
    D: ServiceDirectory + Sync + ?Sized,
{
    let mut services = Vec::with_capacity(names.len());
    for name in names {
        if let Some(service) = directory.find_by_name(name).await? {
            services.push(service);
        }
    }
    Ok(services)
}

impl JobEvent {
    /// Planned remaining path, exactly as the payload records it.
    pub fn pending_services(&self) -> Vec<String> {
        self.payload.route()
    }

    /// Finished pipeline steps, sub-step markers excluded, in completion
    /// order.
    pub fn completed_services(&self) -> Vec<String> {
        self.payload.completed_steps()
    }

    /// Completed services first, then the remaining planned order.
    ///
    /// Approximates the execution timeline; the only guarantee is
    /// "completed before pending".
    pub fn route_services(&self) -> Vec<String> {
        let mut services = self.completed_services();
        services.extend(self.pending_services());
        services
    }

    /// [`Self::pending_services`] resolved to registered entities.
    pub async fn pending_services_resolved<D>(
        &self,
        directory: &D,
    ) -> Result<Vec<Service>, D::Error>
    where
        D: ServiceDirectory + Sync + ?Sized,
    {
        resolve_service_names(directory, &self.pending_services()).await
    }

    /// [`Self::completed_services`] resolved to registered entities.
    pub async fn completed_services_resolved<D>(
        &self,
        directory: &D,
    ) -> Result<Vec<Service>, D::Error>
    where
        D: ServiceDirectory + Sync + ?Sized,
    {
        resolve_service_names(directory, &self.completed_services()).await
    }

    /// [`Self::route_services`] resolved to registered entities.
    pub async fn route_services_resolved<D>(
        &self,
        directory: &D,
    ) -> Result<Vec<Service>, D::Error>
    where
        D: ServiceDirectory + Sync + ?Sized,
    {
        resolve_service_names(directory, &self.route_services()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::JobPayload;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::convert::Infallible;

    struct MapDirectory(HashMap<String, Service>);

    impl MapDirectory {
        fn with_names(names: &[&str]) -> Self {
            let map = names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let service = Service {
                        id: i as i64 + 1,
                        name: name.to_string(),
                        description: None,
                        created_at: 0,
                    };
                    (name.to_string(), service)
                })
                .collect();
            Self(map)
        }
    }

    #[async_trait]
    impl ServiceDirectory for MapDirectory {
        type Error = Infallible;

        async fn find_by_name(&self, name: &str) -> Result<Option<Service>, Infallible> {
            Ok(self.0.get(name).cloned())
        }
    }

    fn event() -> JobEvent {
        JobEvent {
            id: 1,
            message_id: "m1".to_string(),
            account_id: 1,
            payload: JobPayload::new(json!({
                "complete": ["fetch", "lint:style", "build"],
                "data": { "router": { "route": ["test", "deploy"] } }
            })),
            status: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_pending_is_route_verbatim() {
        assert_eq!(event().pending_services(), vec!["test", "deploy"]);
    }

    #[test]
    fn test_completed_excludes_sub_step_markers() {
        let completed = event().completed_services();
        assert_eq!(completed, vec!["fetch", "build"]);
        assert!(completed.iter().all(|s| !s.contains(':')));
    }

    #[test]
    fn test_route_services_is_completed_then_pending() {
        assert_eq!(
            event().route_services(),
            vec!["fetch", "build", "test", "deploy"]
        );
    }

    #[tokio::test]
    async fn test_resolution_drops_unregistered_names() {
        // "deploy" is not registered; it vanishes without an error.
        let directory = MapDirectory::with_names(&["fetch", "build", "test"]);
        let resolved = event().route_services_resolved(&directory).await.unwrap();
        let names: Vec<&str> = resolved.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["fetch", "build", "test"]);
    }

    #[tokio::test]
    async fn test_resolution_preserves_order() {
        let directory = MapDirectory::with_names(&["deploy", "test"]);
        let resolved = event().pending_services_resolved(&directory).await.unwrap();
        let names: Vec<&str> = resolved.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["test", "deploy"]);
    }

    #[tokio::test]
    async fn test_empty_directory_resolves_to_empty() {
        let directory = MapDirectory::with_names(&[]);
        let resolved = event()
            .completed_services_resolved(&directory)
            .await
            .unwrap();
        assert!(resolved.is_empty());
    }
}
