//! Outbound S6F11 and S5F1 delivery

use crate::handlers::EquipmentCore;
use secs_core::GemId;
use secs_gem::{AckC5, AckC6, AlarmReport, EventReport};
use secs_hsms::HsmsConnection;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Work queued for the emitter task
#[derive(Debug, Clone)]
pub(crate) enum Emission {
    Event(EventReport),
    /// Event raised by a remote command, reported once the S2F42 is out
    CommandEvent(GemId),
    Alarm(AlarmReport),
}

/// Send queued emissions one at a time, in order
pub(crate) async fn run_emitter(
    core: Arc<EquipmentCore>,
    connection: HsmsConnection,
    mut queue: mpsc::UnboundedReceiver<Emission>,
) {
    while let Some(emission) = queue.recv().await {
        let emission = match emission {
            Emission::CommandEvent(ceid) => {
                tokio::time::sleep(core.config.command_event_delay).await;
                match core.model.trigger_event(&ceid) {
                    Ok(Some(report)) => Emission::Event(report),
                    Ok(None) => continue,
                    Err(err) => {
                        log::warn!("Command event {}: {}", ceid, err);
                        continue;
                    }
                }
            }
            other => other,
        };

        if !core.link.is_communicating() || !core.control_state().is_online() {
            log::info!(
                "Dropping {:?}: communication {}, control {}",
                emission,
                core.link.state().as_str(),
                core.control_state().as_str()
            );
            continue;
        }

        match emission {
            Emission::Event(report) => send_event(&connection, report).await,
            Emission::Alarm(report) => send_alarm(&connection, report).await,
            Emission::CommandEvent(_) => {}
        }
    }
    log::debug!("Emitter queue closed");
}

async fn send_event(connection: &HsmsConnection, report: EventReport) {
    let ceid = report.ceid.clone();
    match connection.request(6, 11, Some(report.to_item())).await {
        Ok(reply) => match reply.body().and_then(AckC6::from_item) {
            Some(AckC6::Accepted) => log::debug!("Event {} acknowledged", ceid),
            other => log::warn!("Event {} answered with {:?}", ceid, other),
        },
        Err(err) => log::warn!("S6F11 for event {} failed: {}", ceid, err),
    }
}

async fn send_alarm(connection: &HsmsConnection, report: AlarmReport) {
    let id = report.id.clone();
    match connection.request(5, 1, Some(report.to_item())).await {
        Ok(reply) => match reply.body().and_then(AckC5::from_item) {
            Some(AckC5::Accepted) => log::debug!("Alarm {} acknowledged", id),
            other => log::warn!("Alarm {} answered with {:?}", id, other),
        },
        Err(err) => log::warn!("S5F1 for alarm {} failed: {}", id, err),
    }
}
