use std::sync::Arc;

use serde_json::Value;

use crate::catalog::Catalog;
use crate::dates::DateRange;
use crate::error::{Error, Result, describe_remote_error};
use crate::session::Session;
use crate::task::{AreaGeometry, OutputFormat, TaskHandle, TaskSpec, resolve_layers};
use crate::transport::Method;

#[derive(Debug, serde::Deserialize)]
struct SubmitReply {
    #[serde(default)]
    task_id: Option<String>,
}

/// Validates task requests and hands them to the service.
#[derive(Debug, Clone)]
pub struct TaskSubmitter {
    session: Session,
    catalog: Arc<Catalog>,
}

impl TaskSubmitter {
    pub fn new(session: Session, catalog: Arc<Catalog>) -> Self {
        Self { session, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn submit_point<S: AsRef<str>>(
        &self,
        latitude: f64,
        longitude: f64,
        product_id: &str,
        band_names: &[S],
        dates: DateRange,
    ) -> Result<TaskHandle> {
        let spec = self.point_spec(latitude, longitude, product_id, band_names, dates)?;
        self.submit(&spec)
    }

    pub fn submit_area<S: AsRef<str>>(
        &self,
        geometry: Value,
        product_id: &str,
        band_names: &[S],
        dates: DateRange,
        projection: &str,
        format: OutputFormat,
    ) -> Result<TaskHandle> {
        let spec = self.area_spec(geometry, product_id, band_names, dates, projection, format)?;
        self.submit(&spec)
    }

    /// Builds a point spec; nothing is sent.
    pub fn point_spec<S: AsRef<str>>(
        &self,
        latitude: f64,
        longitude: f64,
        product_id: &str,
        band_names: &[S],
        dates: DateRange,
    ) -> Result<TaskSpec> {
        let layers = resolve_layers(&self.catalog, product_id, band_names)?;
        Ok(TaskSpec::point(latitude, longitude, dates, layers)?)
    }

    /// Builds an area spec; nothing is sent.
    pub fn area_spec<S: AsRef<str>>(
        &self,
        geometry: Value,
        product_id: &str,
        band_names: &[S],
        dates: DateRange,
        projection: &str,
        format: OutputFormat,
    ) -> Result<TaskSpec> {
        let layers = resolve_layers(&self.catalog, product_id, band_names)?;
        let geometry = AreaGeometry::from_geojson(geometry)?;
        Ok(TaskSpec::area(geometry, dates, layers, projection, format)?)
    }

    pub fn submit(&self, spec: &TaskSpec) -> Result<TaskHandle> {
        self.submit_named(spec, &spec.default_name())
    }

    /// Sends exactly one submission request. The service answers 202 with
    /// a task id when it accepts the task.
    pub fn submit_named(&self, spec: &TaskSpec, task_name: &str) -> Result<TaskHandle> {
        spec.validate(&self.catalog)?;

        let resp = self
            .session
            .request(Method::Post, "task", Some(spec.request_body(task_name)))?;
        let status = resp.status;
        if status != 202 {
            let body = resp.text().unwrap_or_default();
            return Err(Error::SubmissionFailed {
                status,
                message: describe_remote_error(status, &body),
            });
        }

        let reply: SubmitReply = resp.json("reading submission reply")?;
        match reply.task_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                log::info!("submitted {} task `{}` as {}", spec.task_type(), task_name, id);
                Ok(TaskHandle::new(id))
            }
            None => Err(Error::SubmissionFailed {
                status,
                message: "accepted response carried no task_id".to_string(),
            }),
        }
    }
}
