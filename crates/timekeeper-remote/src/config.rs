use timekeeper_core::config::RemoteSettings;

/// Resolved remote-provider configuration, constructed once at startup and
/// passed into the client constructors.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub project_id: String,
    pub region: String,
    /// Public base URL of this deployment — callback targets are built on it.
    pub root_url: String,
    /// Default outbound identity (per-clock overrides apply on top).
    pub service_account: String,
    /// Queue for deferred task dispatch.
    pub queue: Option<String>,
    pub time_zone: String,
}

impl RemoteConfig {
    pub fn from_settings(settings: &RemoteSettings) -> Self {
        Self {
            project_id: settings.project_id.clone(),
            region: settings.region.clone(),
            root_url: settings.root_url(),
            service_account: settings.service_account(),
            queue: if settings.use_queue() {
                settings.queue.clone()
            } else {
                None
            },
            time_zone: settings.time_zone.clone(),
        }
    }

    /// Fully-qualified scheduler job name for a short job name.
    pub fn job_path(&self, name: &str) -> String {
        format!(
            "projects/{}/locations/{}/jobs/{}",
            self.project_id, self.region, name
        )
    }

    /// Fully-qualified parent for job creation.
    pub fn location_path(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.region)
    }

    /// Fully-qualified queue name. `None` when deferred dispatch is off.
    pub fn queue_path(&self) -> Option<String> {
        self.queue.as_ref().map(|q| {
            format!(
                "projects/{}/locations/{}/queues/{}",
                self.project_id, self.region, q
            )
        })
    }

    /// Callback URL the remote scheduler hits on a clock tick.
    pub fn tick_url(&self, clock_id: i64) -> String {
        format!("{}/api/clocks/{}/tick/", self.root_url, clock_id)
    }

    /// Callback URL the remote queue hits to resume a pending execution.
    pub fn execute_url(&self, task_id: i64, execution_id: i64) -> String {
        format!(
            "{}/api/tasks/{}/execute/?task_execution_id={}",
            self.root_url, task_id, execution_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            project_id: "acme".into(),
            region: "us-central1".into(),
            root_url: "https://acme.appspot.com".into(),
            service_account: "acme@appspot.gserviceaccount.com".into(),
            queue: Some("executions".into()),
            time_zone: "UTC".into(),
        }
    }

    #[test]
    fn resource_paths() {
        let c = config();
        assert_eq!(
            c.job_path("Every-Day"),
            "projects/acme/locations/us-central1/jobs/Every-Day"
        );
        assert_eq!(
            c.queue_path().unwrap(),
            "projects/acme/locations/us-central1/queues/executions"
        );
        assert_eq!(c.tick_url(7), "https://acme.appspot.com/api/clocks/7/tick/");
        assert_eq!(
            c.execute_url(3, 41),
            "https://acme.appspot.com/api/tasks/3/execute/?task_execution_id=41"
        );
    }
}
