use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::merge::merge_candidates;
use crate::db::GymStore;
use crate::geocoding::Geocoder;
use crate::progress::{SearchProgressManager, SearchStatus};
use crate::sources::GymSource;

/// Overall time budget of one search
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Progress band reserved for querying external sources
const SOURCES_START: f64 = 50.0;
const SOURCES_END: f64 = 70.0;

/// Runs gym searches in the background and reports every phase to the
/// progress manager (geocode, check stored data, query sources, merge, store).
#[derive(Clone)]
pub struct SearchDriver {
    manager: SearchProgressManager,
    geocoder: Arc<dyn Geocoder>,
    store: Arc<dyn GymStore>,
    sources: Vec<Arc<dyn GymSource>>,
    timeout: Duration,
}

impl SearchDriver {
    pub fn new(
        manager: SearchProgressManager,
        geocoder: Arc<dyn Geocoder>,
        store: Arc<dyn GymStore>,
        sources: Vec<Arc<dyn GymSource>>,
    ) -> Self {
        Self {
            manager,
            geocoder,
            store,
            sources,
            timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start a search and return its id right away; the work runs on its own task.
    pub fn trigger(&self, location: &str, radius: f64) -> String {
        let search_id = self.manager.create_search(location, radius);

        let driver = self.clone();
        let id = search_id.clone();
        let location = location.to_string();
        tokio::spawn(async move {
            driver.run(&id, &location, radius).await;
        });

        search_id
    }

    /// Run a created search to completion. Every way out, including timeout
    /// and panic, ends with a terminal update.
    pub async fn run(&self, search_id: &str, location: &str, radius: f64) {
        let driver = self.clone();
        let id = search_id.to_string();
        let loc = location.to_string();
        let mut work = tokio::spawn(async move { driver.perform(&id, &loc, radius).await });

        match tokio::time::timeout(self.timeout, &mut work).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                tracing::error!("Search {} failed: {:#}", search_id, e);
                self.fail(search_id, format!("{:#}", e));
            }
            Ok(Err(e)) => {
                tracing::error!("Search {} task ended abnormally: {}", search_id, e);
                self.fail(search_id, format!("Search task ended abnormally: {}", e));
            }
            Err(_) => {
                // Wait for the abort to land so no late phase update overwrites the error
                work.abort();
                let _ = work.await;
                tracing::error!("Search {} timed out after {:?}", search_id, self.timeout);
                self.manager.update_progress(
                    search_id,
                    SearchStatus::Error,
                    0.0,
                    "Search timed out",
                    Some(format!(
                        "Search operation exceeded {} seconds",
                        self.timeout.as_secs_f64()
                    )),
                    None,
                );
            }
        }
    }

    fn fail(&self, search_id: &str, message: String) {
        self.manager
            .update_progress(search_id, SearchStatus::Error, 0.0, "Search failed", Some(message), None);
    }

    async fn perform(&self, search_id: &str, location: &str, radius: f64) -> Result<()> {
        let progress = &self.manager;

        progress.update_progress(
            search_id,
            SearchStatus::Geocoding,
            10.0,
            "Converting location to coordinates",
            None,
            None,
        );

        let Some(location_info) = self.geocoder.search_location(location).await? else {
            progress.update_progress(
                search_id,
                SearchStatus::Error,
                10.0,
                "Location not found",
                Some(format!("Could not find location: {}", location)),
                None,
            );
            return Ok(());
        };

        progress.update_progress(
            search_id,
            SearchStatus::Searching,
            20.0,
            "Location found",
            None,
            Some(serde_json::to_value(&location_info)?),
        );

        progress.update_progress(search_id, SearchStatus::Searching, 30.0, "Checking existing data", None, None);
        if self.store.has_gyms_for_city(location).await? {
            progress.update_progress(
                search_id,
                SearchStatus::Complete,
                100.0,
                "Search complete",
                Some("Found existing gym data in database".to_string()),
                None,
            );
            return Ok(());
        }

        if self.sources.is_empty() {
            progress.update_progress(
                search_id,
                SearchStatus::Error,
                SOURCES_START,
                "No data sources configured",
                Some("Configure a Google Places or Yelp API key to search for gyms".to_string()),
                None,
            );
            return Ok(());
        }

        let step = if self.sources.len() > 1 {
            (SOURCES_END - SOURCES_START) / (self.sources.len() - 1) as f64
        } else {
            0.0
        };

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for (i, source) in self.sources.iter().enumerate() {
            progress.update_progress(
                search_id,
                source.search_status(),
                SOURCES_START + step * i as f64,
                &format!("Searching {} for gyms", source.name()),
                None,
                None,
            );

            match source.search(&location_info, radius).await {
                Ok(found) => {
                    tracing::debug!("Search {}: {} returned {} gyms", search_id, source.name(), found.len());
                    candidates.extend(found);
                }
                Err(e) => {
                    tracing::warn!("Search {}: source {} failed: {:#}", search_id, source.name(), e);
                    failures.push(format!("{}: {:#}", source.name(), e));
                }
            }
        }

        if failures.len() == self.sources.len() {
            anyhow::bail!("All data sources failed: {}", failures.join("; "));
        }

        progress.update_progress(
            search_id,
            SearchStatus::Merging,
            90.0,
            "Merging and storing results",
            None,
            None,
        );

        let gyms = merge_candidates(candidates);
        let stored = self.store.upsert_gyms(location, &gyms).await?;
        if !stored.success {
            tracing::warn!("Search {}: {} gyms could not be stored", search_id, stored.errors.len());
        }

        progress.update_progress(
            search_id,
            SearchStatus::Complete,
            100.0,
            "Search complete",
            Some(format!("Found {} gyms", gyms.len())),
            None,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gym, GymCandidate, ImportResult, LocationInfo};
    use crate::progress::SearchProgress;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FakeGeocoder(Option<LocationInfo>);

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn search_location(&self, _query: &str) -> Result<Option<LocationInfo>> {
            Ok(self.0.clone())
        }
    }

    struct FailingGeocoder;

    #[async_trait]
    impl Geocoder for FailingGeocoder {
        async fn search_location(&self, _query: &str) -> Result<Option<LocationInfo>> {
            anyhow::bail!("geocoder unreachable")
        }
    }

    #[derive(Default)]
    struct FakeStore {
        known_cities: Vec<String>,
        stored: Mutex<Vec<GymCandidate>>,
    }

    #[async_trait]
    impl GymStore for FakeStore {
        async fn has_gyms_for_city(&self, city: &str) -> Result<bool> {
            Ok(self.known_cities.iter().any(|c| c == city))
        }

        async fn upsert_gyms(&self, _city: &str, gyms: &[GymCandidate]) -> Result<ImportResult> {
            self.stored.lock().extend_from_slice(gyms);
            Ok(ImportResult {
                success: true,
                gyms_imported: gyms.len() as u64,
                gyms_updated: 0,
                errors: Vec::new(),
                import_duration_seconds: 0.0,
            })
        }

        async fn list_by_city(&self, _city: &str, _limit: u32) -> Result<Vec<Gym>> {
            Ok(Vec::new())
        }

        async fn get_gym(&self, _id: &str) -> Result<Option<Gym>> {
            Ok(None)
        }

        async fn list_near(&self, _lat: f64, _lon: f64, _radius: f64) -> Result<Vec<Gym>> {
            Ok(Vec::new())
        }
    }

    enum Behaviour {
        Found(Vec<GymCandidate>),
        Fail,
        Hang,
        /// Holds its worker thread without yielding, then succeeds
        Block(Duration),
    }

    struct FakeSource {
        name: &'static str,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl GymSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _location: &LocationInfo, _radius: f64) -> Result<Vec<GymCandidate>> {
            match &self.behaviour {
                Behaviour::Found(gyms) => Ok(gyms.clone()),
                Behaviour::Fail => anyhow::bail!("HTTP 500"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
                Behaviour::Block(duration) => {
                    std::thread::sleep(*duration);
                    Ok(vec![gym("Late Gym", self.name)])
                }
            }
        }
    }

    fn austin() -> LocationInfo {
        LocationInfo {
            latitude: 30.2672,
            longitude: -97.7431,
            display_name: "Austin, Texas, United States".to_string(),
            city: Some("Austin".to_string()),
            state: Some("Texas".to_string()),
            postal_code: None,
            google_place_id: None,
        }
    }

    fn gym(name: &str, source: &str) -> GymCandidate {
        GymCandidate {
            name: name.to_string(),
            address: "1 Main St".to_string(),
            latitude: 30.2672,
            longitude: -97.7431,
            phone: None,
            website: None,
            rating: None,
            review_count: None,
            sources: vec![source.to_string()],
            confidence: 0.6,
        }
    }

    fn source(name: &'static str, behaviour: Behaviour) -> Arc<dyn GymSource> {
        Arc::new(FakeSource { name, behaviour })
    }

    /// Run a search to the end and collect every snapshot a subscriber saw
    async fn run_search(driver: &SearchDriver, manager: &SearchProgressManager) -> Vec<SearchProgress> {
        let id = manager.create_search("Austin", 10.0);
        let mut sub = manager.subscribe(&id).unwrap();
        driver.run(&id, "Austin", 10.0).await;

        let mut seen = Vec::new();
        while let Some(progress) = sub.recv().await {
            seen.push(progress);
        }
        seen
    }

    fn steps(seen: &[SearchProgress]) -> Vec<(String, f64)> {
        seen.iter()
            .map(|p| (p.status.to_string(), p.progress_percentage))
            .collect()
    }

    #[tokio::test]
    async fn test_full_search_ladder() {
        let manager = SearchProgressManager::new();
        let store = Arc::new(FakeStore::default());
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(Some(austin()))),
            store.clone(),
            vec![
                source(
                    "yelp",
                    Behaviour::Found(vec![gym("Iron Temple", "yelp"), gym("Lift House", "yelp")]),
                ),
                source("google", Behaviour::Found(vec![gym("Iron Temple", "google")])),
            ],
        );

        let seen = run_search(&driver, &manager).await;
        assert_eq!(
            steps(&seen),
            vec![
                ("pending".to_string(), 0.0),
                ("geocoding".to_string(), 10.0),
                ("searching".to_string(), 20.0),
                ("searching".to_string(), 30.0),
                ("searching_yelp".to_string(), 50.0),
                ("searching_google".to_string(), 70.0),
                ("merging".to_string(), 90.0),
                ("complete".to_string(), 100.0),
            ]
        );
        assert!(seen[2].location_info.as_deref().unwrap().contains("\"city\":\"Austin\""));
        assert_eq!(seen[4].current_step, "Searching yelp for gyms");
        assert_eq!(seen[5].current_step, "Searching google for gyms");

        let done = seen.last().unwrap();
        assert_eq!(done.message.as_deref(), Some("Found 2 gyms"));
        assert!(done.location_info.is_some());
        assert_eq!(store.stored.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_location_not_found() {
        let manager = SearchProgressManager::new();
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(None)),
            Arc::new(FakeStore::default()),
            vec![source("yelp", Behaviour::Found(Vec::new()))],
        );

        let seen = run_search(&driver, &manager).await;
        let last = seen.last().unwrap();
        assert_eq!(last.status, SearchStatus::Error);
        assert_eq!(last.current_step, "Location not found");
        assert_eq!(last.message.as_deref(), Some("Could not find location: Austin"));
    }

    #[tokio::test]
    async fn test_existing_data_short_circuits() {
        let manager = SearchProgressManager::new();
        let store = Arc::new(FakeStore {
            known_cities: vec!["Austin".to_string()],
            ..Default::default()
        });
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(Some(austin()))),
            store,
            vec![source("yelp", Behaviour::Fail)],
        );

        let seen = run_search(&driver, &manager).await;
        let last = seen.last().unwrap();
        assert_eq!(last.status, SearchStatus::Complete);
        assert_eq!(last.message.as_deref(), Some("Found existing gym data in database"));
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn test_no_sources_configured() {
        let manager = SearchProgressManager::new();
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(Some(austin()))),
            Arc::new(FakeStore::default()),
            Vec::new(),
        );

        let last = run_search(&driver, &manager).await.pop().unwrap();
        assert_eq!(last.status, SearchStatus::Error);
        assert_eq!(last.current_step, "No data sources configured");
    }

    #[tokio::test]
    async fn test_one_failing_source_is_tolerated() {
        let manager = SearchProgressManager::new();
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(Some(austin()))),
            Arc::new(FakeStore::default()),
            vec![
                source("google_places", Behaviour::Fail),
                source("yelp", Behaviour::Found(vec![gym("Lift House", "yelp")])),
            ],
        );

        let last = run_search(&driver, &manager).await.pop().unwrap();
        assert_eq!(last.status, SearchStatus::Complete);
        assert_eq!(last.message.as_deref(), Some("Found 1 gyms"));
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_an_error() {
        let manager = SearchProgressManager::new();
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(Some(austin()))),
            Arc::new(FakeStore::default()),
            vec![source("google_places", Behaviour::Fail), source("yelp", Behaviour::Fail)],
        );

        let last = run_search(&driver, &manager).await.pop().unwrap();
        assert_eq!(last.status, SearchStatus::Error);
        assert_eq!(last.current_step, "Search failed");
        let message = last.message.unwrap();
        assert!(message.contains("All data sources failed"));
        assert!(message.contains("yelp: HTTP 500"));
    }

    #[tokio::test]
    async fn test_phase_error_becomes_terminal_update() {
        let manager = SearchProgressManager::new();
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FailingGeocoder),
            Arc::new(FakeStore::default()),
            Vec::new(),
        );

        let last = run_search(&driver, &manager).await.pop().unwrap();
        assert_eq!(last.status, SearchStatus::Error);
        assert_eq!(last.progress_percentage, 0.0);
        assert_eq!(last.message.as_deref(), Some("geocoder unreachable"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_terminal_update() {
        let manager = SearchProgressManager::new();
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(Some(austin()))),
            Arc::new(FakeStore::default()),
            vec![source("yelp", Behaviour::Hang)],
        )
        .with_timeout(Duration::from_millis(50));

        let seen = run_search(&driver, &manager).await;
        let last = seen.last().unwrap();
        assert_eq!(last.status, SearchStatus::Error);
        assert_eq!(last.current_step, "Search timed out");
        assert_eq!(last.message.as_deref(), Some("Search operation exceeded 0.05 seconds"));
        assert_eq!(seen[seen.len() - 2].current_step, "Searching yelp for gyms");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_error_is_final_state() {
        let manager = SearchProgressManager::new();
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(Some(austin()))),
            Arc::new(FakeStore::default()),
            vec![source("yelp", Behaviour::Block(Duration::from_millis(200)))],
        )
        .with_timeout(Duration::from_millis(50));

        let id = manager.create_search("Austin", 10.0);
        driver.run(&id, "Austin", 10.0).await;

        // The phase work that outlived the timeout must not report after the error
        tokio::time::sleep(Duration::from_millis(300)).await;
        let snapshot = manager.get_search(&id).unwrap();
        assert_eq!(snapshot.status, SearchStatus::Error);
        assert_eq!(snapshot.current_step, "Search timed out");
    }

    #[tokio::test]
    async fn test_trigger_returns_id_immediately() {
        let manager = SearchProgressManager::new();
        let driver = SearchDriver::new(
            manager.clone(),
            Arc::new(FakeGeocoder(None)),
            Arc::new(FakeStore::default()),
            Vec::new(),
        );

        let id = driver.trigger("Atlantis", 5.0);
        let mut sub = manager.subscribe(&id).unwrap();

        let mut last = None;
        while let Some(progress) = sub.recv().await {
            last = Some(progress);
        }
        let last = last.unwrap();
        assert_eq!(last.search_id, id);
        assert_eq!(last.message.as_deref(), Some("Could not find location: Atlantis"));
    }
}
