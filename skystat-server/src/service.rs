///! Request orchestration: resolve a snapshot, format it for the status
///! readout, or drive a sky render for it. Stateless per request; all
///! persistent state lives in the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use skystat_common::coords;
use skystat_common::{NewSnapshot, StatusSnapshot};

use crate::config::RendererConfig;
use crate::error::ServiceError;
use crate::render::{RenderDiagnostic, RenderParams, SkyRender};
use crate::store::SnapshotStore;

/// Hard ceiling on the render budget, whatever the stored exposure says.
const MAX_RENDER_BUDGET_SECS: f64 = 3600.0;

/// Which snapshot a query is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSelector {
    Latest,
    Id(i64),
}

impl SnapshotSelector {
    /// Absent ids and non-positive sentinels both mean "latest".
    pub fn from_query(id: Option<i64>) -> Self {
        match id {
            Some(id) if id > 0 => SnapshotSelector::Id(id),
            _ => SnapshotSelector::Latest,
        }
    }
}

/// A resolved snapshot plus the neighbor ids for pagination. Neighbors are
/// not bounds-checked: walking past either end surfaces NotFound on the
/// next query.
#[derive(Debug, Clone)]
pub struct ResolvedSnapshot {
    pub snapshot: StatusSnapshot,
    pub previous_id: i64,
    pub next_id: i64,
}

/// Snapshot formatted for the status readout.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayRecord {
    pub id: i64,
    pub instrument: String,
    pub project: String,
    pub update_time: DateTime<Utc>,
    pub avg_guide_error: f64,
    pub ccd_temperature: f64,
    pub last_image_start: DateTime<Utc>,
    /// Clamped and rounded to whole seconds.
    pub exposure_time: u64,
    pub current_task_id: i64,
    /// Sexagesimal with the sign character stripped, per the legacy readout.
    pub right_ascension: String,
    /// Signed sexagesimal.
    pub declination: String,
    pub pier_side: &'static str,
    pub filter: &'static str,
    pub site_longitude: String,
    pub site_latitude: String,
    pub focus: i64,
    pub previous_id: i64,
    pub next_id: i64,
    /// Image query path for this snapshot; unkeyed when the request was
    /// "latest".
    pub image_ref: String,
}

/// Outcome of an image query once the snapshot has resolved.
pub enum RenderOutcome {
    Image(Vec<u8>),
    Failed(RenderDiagnostic),
}

pub struct ImageResponse {
    pub outcome: RenderOutcome,
    /// Refresh/cache hint in seconds: the clamped exposure time.
    pub refresh_secs: u64,
}

pub struct StatusService {
    store: SnapshotStore,
    renderer: Arc<dyn SkyRender>,
    image_size: u32,
    cardinal_markers: bool,
}

impl StatusService {
    pub fn new(
        store: SnapshotStore,
        renderer: Arc<dyn SkyRender>,
        renderer_config: &RendererConfig,
    ) -> Self {
        Self {
            store,
            renderer,
            image_size: renderer_config.image_size,
            cardinal_markers: renderer_config.cardinal_markers,
        }
    }

    /// Persist one freshly ingested snapshot; returns the assigned id.
    pub async fn ingest(&self, fields: NewSnapshot) -> Result<i64, ServiceError> {
        let id = self.store.append(fields).await?;
        tracing::info!("recorded snapshot {}", id);
        Ok(id)
    }

    pub async fn resolve(
        &self,
        selector: SnapshotSelector,
    ) -> Result<ResolvedSnapshot, ServiceError> {
        let snapshot = match selector {
            SnapshotSelector::Latest => self.store.get_latest().await?,
            SnapshotSelector::Id(id) => self.store.get_by_id(id).await?,
        };
        Ok(ResolvedSnapshot {
            previous_id: snapshot.id - 1,
            next_id: snapshot.id + 1,
            snapshot,
        })
    }

    /// Format a resolved snapshot for the status readout. Fails with
    /// `UnknownFilter` when the stored filter code is outside the closed
    /// enumeration.
    pub fn format_display(
        &self,
        resolved: &ResolvedSnapshot,
        selector: SnapshotSelector,
    ) -> Result<DisplayRecord, ServiceError> {
        let snapshot = &resolved.snapshot;
        let filter = snapshot.filter()?;

        // Right ascension keeps the legacy convention: magnitude only.
        let right_ascension = coords::format_sexagesimal(snapshot.right_ascension, 0)[1..].to_string();
        let image_ref = match selector {
            SnapshotSelector::Latest => "/image".to_string(),
            SnapshotSelector::Id(_) => format!("/image?id={}", snapshot.id),
        };

        Ok(DisplayRecord {
            id: snapshot.id,
            instrument: snapshot.instrument.clone(),
            project: snapshot.project.clone(),
            update_time: snapshot.update_time,
            avg_guide_error: snapshot.avg_guide_error,
            ccd_temperature: snapshot.ccd_temperature,
            last_image_start: snapshot.last_image_start,
            exposure_time: snapshot.display_exposure_secs(),
            current_task_id: snapshot.current_task_id,
            right_ascension,
            declination: coords::format_sexagesimal(snapshot.declination, 0),
            pier_side: if snapshot.west_pier { "west" } else { "east" },
            filter: filter.label(),
            site_longitude: coords::format_longitude(snapshot.site_longitude),
            site_latitude: coords::format_latitude(snapshot.site_latitude),
            focus: snapshot.focus,
            previous_id: resolved.previous_id,
            next_id: resolved.next_id,
            image_ref,
        })
    }

    /// Map a snapshot 1:1 onto renderer parameters. The render time is the
    /// last exposure start; the budget is the clamped exposure time.
    pub fn build_render_request(&self, snapshot: &StatusSnapshot) -> RenderParams {
        RenderParams {
            epoch_seconds: snapshot.last_image_start.timestamp(),
            right_ascension_deg: snapshot.right_ascension,
            declination_deg: snapshot.declination,
            site_latitude_deg: snapshot.site_latitude,
            site_longitude_deg: snapshot.site_longitude,
            size_px: self.image_size,
            cardinal_markers: self.cardinal_markers,
            budget: Duration::from_secs_f64(
                snapshot.effective_exposure_secs().min(MAX_RENDER_BUDGET_SECS),
            ),
        }
    }

    /// Resolve a snapshot and render its sky image. Render failures come
    /// back as a diagnostic outcome, not an error: the handler degrades
    /// them to a text response instead of a service fault.
    pub async fn render_image(
        &self,
        selector: SnapshotSelector,
    ) -> Result<ImageResponse, ServiceError> {
        let resolved = self.resolve(selector).await?;
        let params = self.build_render_request(&resolved.snapshot);

        let outcome = match self.renderer.render(&params).await {
            Ok(bytes) => RenderOutcome::Image(bytes),
            Err(diagnostic) => {
                tracing::warn!("sky render failed: {}", diagnostic.invocation);
                RenderOutcome::Failed(diagnostic)
            }
        };

        Ok(ImageResponse {
            outcome,
            refresh_secs: resolved.snapshot.display_exposure_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use skystat_common::UnknownFilter;

    struct StubRenderer {
        result: Result<Vec<u8>, RenderDiagnostic>,
    }

    #[async_trait]
    impl SkyRender for StubRenderer {
        async fn render(&self, _params: &RenderParams) -> Result<Vec<u8>, RenderDiagnostic> {
            self.result.clone()
        }
    }

    fn sample_fields(task_id: i64) -> NewSnapshot {
        let t = Utc.with_ymd_and_hms(2026, 3, 14, 2, 10, 0).unwrap();
        NewSnapshot {
            instrument: "imaging-ccd".to_string(),
            project: "m42".to_string(),
            update_time: t,
            avg_guide_error: 0.8,
            ccd_temperature: -15.5,
            last_image_start: t,
            exposure_time: 4.0,
            current_task_id: task_id,
            right_ascension: 40.5,
            declination: -5.25,
            west_pier: true,
            filter_code: 3,
            site_longitude: 8.5,
            site_latitude: 47.25,
            focus: 31250,
        }
    }

    fn service(dir: &tempfile::TempDir, result: Result<Vec<u8>, RenderDiagnostic>) -> StatusService {
        let store = SnapshotStore::open(dir.path().join("snapshots.db")).unwrap();
        StatusService::new(
            store,
            Arc::new(StubRenderer { result }),
            &RendererConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_resolve_latest_and_neighbor_ids() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, Ok(Vec::new()));

        service.ingest(sample_fields(1)).await.unwrap();
        service.ingest(sample_fields(2)).await.unwrap();

        let resolved = service.resolve(SnapshotSelector::Latest).await.unwrap();
        assert_eq!(resolved.snapshot.id, 2);
        assert_eq!(resolved.previous_id, 1);
        assert_eq!(resolved.next_id, 3);

        let err = service.resolve(SnapshotSelector::Id(3)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_selector_sentinels() {
        assert_eq!(SnapshotSelector::from_query(None), SnapshotSelector::Latest);
        assert_eq!(
            SnapshotSelector::from_query(Some(-1)),
            SnapshotSelector::Latest
        );
        assert_eq!(
            SnapshotSelector::from_query(Some(0)),
            SnapshotSelector::Latest
        );
        assert_eq!(
            SnapshotSelector::from_query(Some(5)),
            SnapshotSelector::Id(5)
        );
    }

    #[tokio::test]
    async fn test_format_display_applies_all_conventions() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, Ok(Vec::new()));
        service.ingest(sample_fields(1)).await.unwrap();

        let resolved = service.resolve(SnapshotSelector::Latest).await.unwrap();
        let record = service
            .format_display(&resolved, SnapshotSelector::Latest)
            .unwrap();

        assert_eq!(record.right_ascension, "40:30:00");
        assert_eq!(record.declination, "-05:15:00");
        assert_eq!(record.site_longitude, "E08:30:00");
        assert_eq!(record.site_latitude, "N47:15:00");
        assert_eq!(record.filter, "Blue");
        assert_eq!(record.pier_side, "west");
        assert_eq!(record.exposure_time, 10);
        assert_eq!(record.image_ref, "/image");

        let record = service
            .format_display(&resolved, SnapshotSelector::Id(1))
            .unwrap();
        assert_eq!(record.image_ref, "/image?id=1");
    }

    #[tokio::test]
    async fn test_unknown_filter_is_reported_not_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, Ok(Vec::new()));

        let mut fields = sample_fields(1);
        fields.filter_code = 42;
        service.ingest(fields).await.unwrap();

        let resolved = service.resolve(SnapshotSelector::Latest).await.unwrap();
        let err = service
            .format_display(&resolved, SnapshotSelector::Latest)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::UnknownFilter(UnknownFilter(42))
        ));
    }

    #[tokio::test]
    async fn test_render_request_uses_clamped_budget_and_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, Ok(Vec::new()));

        let short = sample_fields(1).with_id(1);
        let params = service.build_render_request(&short);
        assert_eq!(params.budget, Duration::from_secs(10));
        assert_eq!(params.epoch_seconds, short.last_image_start.timestamp());
        assert_eq!(params.right_ascension_deg, 40.5);

        let mut long = sample_fields(1);
        long.exposure_time = 90.0;
        let params = service.build_render_request(&long.with_id(2));
        assert_eq!(params.budget, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_render_image_passes_bytes_through() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, Ok(b"png-bytes".to_vec()));
        service.ingest(sample_fields(1)).await.unwrap();

        let response = service.render_image(SnapshotSelector::Latest).await.unwrap();
        assert_eq!(response.refresh_secs, 10);
        match response.outcome {
            RenderOutcome::Image(bytes) => assert_eq!(bytes, b"png-bytes"),
            RenderOutcome::Failed(_) => panic!("expected image bytes"),
        }
    }

    #[tokio::test]
    async fn test_render_image_degrades_to_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let diagnostic = RenderDiagnostic {
            invocation: "astrosky -s 1024".to_string(),
            output: "no star catalog".to_string(),
        };
        let service = service(&dir, Err(diagnostic));
        service.ingest(sample_fields(1)).await.unwrap();

        let response = service.render_image(SnapshotSelector::Latest).await.unwrap();
        match response.outcome {
            RenderOutcome::Failed(diag) => {
                assert_eq!(diag.invocation, "astrosky -s 1024");
                assert_eq!(diag.output, "no star catalog");
            }
            RenderOutcome::Image(_) => panic!("expected a diagnostic"),
        }
    }
}
