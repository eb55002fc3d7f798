//! Task panel: forwards controller events to the command loop and prints
//! the task list.

use anyhow::Result;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use cloudfem_core::app::Controller;
use cloudfem_core::domain::errors::RemoteError;
use cloudfem_core::domain::events::DomainEvent;
use cloudfem_core::domain::ids::RemoteTaskId;
use cloudfem_core::ports::EventDelegate;

/// Event delegate standing in for the GUI panel.
pub struct PanelDelegate {
    tx: UnboundedSender<DomainEvent>,
}

impl PanelDelegate {
    pub fn new(tx: UnboundedSender<DomainEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: DomainEvent) {
        if let Err(err) = self.tx.send(event) {
            debug!(event = ?err.0, "command loop closed, event dropped");
        }
    }
}

impl EventDelegate for PanelDelegate {
    fn on_connection_established(&self) {
        info!("connected to the compute service");
        self.forward(DomainEvent::ConnectionEstablished);
    }

    fn on_connection_failed(&self, err: &RemoteError) {
        warn!(error = %err, "connection failed");
        self.forward(DomainEvent::ConnectionFailed(err.to_string()));
    }

    fn on_task_submitted(&self, id: &RemoteTaskId) {
        info!(task_id = %id, "submitted");
        self.forward(DomainEvent::TaskSubmitted(id.clone()));
    }

    fn on_task_retrieved(&self, id: &RemoteTaskId) {
        info!(task_id = %id, "retrieved");
        self.forward(DomainEvent::TaskRetrieved(id.clone()));
    }

    fn on_task_loaded(&self, id: &RemoteTaskId) {
        info!(task_id = %id, "results loaded");
        self.forward(DomainEvent::TaskLoaded(id.clone()));
    }

    fn on_task_deleted(&self, id: &RemoteTaskId) {
        info!(task_id = %id, "deleted");
        self.forward(DomainEvent::TaskDeleted(id.clone()));
    }

    fn on_task_finished(&self, id: &RemoteTaskId) {
        info!(task_id = %id, "finished");
        self.forward(DomainEvent::TaskFinished(id.clone()));
    }

    fn on_task_failed(&self, id: &RemoteTaskId) {
        warn!(task_id = %id, "failed");
        self.forward(DomainEvent::TaskFailed(id.clone()));
    }
}

/// Print the panel rows and counts as JSON on stdout.
pub fn print_panel(controller: &Controller) -> Result<()> {
    let panel = serde_json::json!({
        "tasks": controller.panel(),
        "counts": controller.counts(),
    });
    println!("{}", serde_json::to_string_pretty(&panel)?);
    Ok(())
}
