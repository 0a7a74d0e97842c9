//! Scheduled workflow triggers
//!
//! Keeps workflow definitions registered against a cron schedule and runs
//! them through the `ExecutionEngine` whenever the schedule fires. Schedules
//! are evaluated in UTC by tokio-cron-scheduler. Registrations live in memory
//! only.

use crate::error::{EngineError, TriggerError};
use crate::runtime::engine::ExecutionEngine;
use crate::runtime::result::WorkflowResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// When a trigger fires
///
/// `weekly` days are 0 (Sunday) to 6, `monthly` days are dates 1 to 31.
/// Times are `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schedule_type", rename_all = "snake_case")]
pub enum Schedule {
    /// Raw cron expression: 5 fields (minute first) or 6/7 fields (seconds first)
    Cron { cron_expression: String },
    Daily { time: String },
    Weekly {
        #[serde(default)]
        days: Vec<u8>,
        time: String,
    },
    Monthly {
        #[serde(default)]
        days: Vec<u8>,
        time: String,
    },
}

impl Schedule {
    /// Seconds-first cron expression understood by the job scheduler
    pub fn to_cron(&self) -> Result<String, TriggerError> {
        match self {
            Self::Cron { cron_expression } => {
                let expression = cron_expression.trim();
                match expression.split_whitespace().count() {
                    5 => Ok(format!("0 {}", expression)),
                    6 | 7 => Ok(expression.to_string()),
                    _ => Err(TriggerError::InvalidSchedule(format!(
                        "'{}' is not a 5, 6 or 7 field cron expression",
                        expression
                    ))),
                }
            }
            Self::Daily { time } => {
                let (hour, minute) = parse_time(time)?;
                Ok(format!("0 {} {} * * *", minute, hour))
            }
            Self::Weekly { days, time } => {
                let (hour, minute) = parse_time(time)?;
                let weekdays = if days.is_empty() {
                    "*".to_string()
                } else {
                    days.iter()
                        .map(|&day| {
                            WEEKDAYS.get(day as usize).copied().ok_or_else(|| {
                                TriggerError::InvalidSchedule(format!("weekday {} is outside 0-6", day))
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?
                        .join(",")
                };
                Ok(format!("0 {} {} * * {}", minute, hour, weekdays))
            }
            Self::Monthly { days, time } => {
                let (hour, minute) = parse_time(time)?;
                if let Some(day) = days.iter().find(|day| !(1..=31).contains(*day)) {
                    return Err(TriggerError::InvalidSchedule(format!(
                        "day of month {} is outside 1-31",
                        day
                    )));
                }
                let dates = if days.is_empty() {
                    "1".to_string()
                } else {
                    days.iter().map(u8::to_string).collect::<Vec<_>>().join(",")
                };
                Ok(format!("0 {} {} {} * *", minute, hour, dates))
            }
        }
    }
}

fn parse_time(time: &str) -> Result<(u32, u32), TriggerError> {
    let invalid = || TriggerError::InvalidSchedule(format!("time '{}' is not HH:MM", time));
    let (hour, minute) = time.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Registration request: an id, a schedule and the workflow to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub id: String,
    #[serde(flatten)]
    pub schedule: Schedule,
    pub workflow: Value,
}

/// Outcome of the most recent firing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRun {
    /// Absent when the run was rejected before starting
    pub run_id: Option<Uuid>,
    pub success: bool,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub id: String,
    pub cron_expression: String,
    pub last_run: Option<TriggerRun>,
}

struct RegisteredTrigger {
    job_id: Uuid,
    cron_expression: String,
    workflow: Arc<Value>,
    last_run: Option<TriggerRun>,
}

impl RegisteredTrigger {
    fn info(&self, id: &str) -> TriggerInfo {
        TriggerInfo {
            id: id.to_string(),
            cron_expression: self.cron_expression.clone(),
            last_run: self.last_run.clone(),
        }
    }
}

type TriggerTable = Arc<RwLock<HashMap<String, RegisteredTrigger>>>;

/// Cron-driven workflow runner
pub struct TriggerService {
    scheduler: RwLock<JobScheduler>,
    triggers: TriggerTable,
    engine: Arc<ExecutionEngine>,
}

impl TriggerService {
    pub async fn new(engine: Arc<ExecutionEngine>) -> Result<Self, TriggerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| TriggerError::Scheduler(e.to_string()))?;

        Ok(Self {
            scheduler: RwLock::new(scheduler),
            triggers: Arc::new(RwLock::new(HashMap::new())),
            engine,
        })
    }

    pub async fn start(&self) -> Result<(), TriggerError> {
        tracing::info!("⏰ Starting workflow trigger scheduler");
        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| TriggerError::Scheduler(e.to_string()))
    }

    pub async fn shutdown(&self) -> Result<(), TriggerError> {
        tracing::info!("⏹️ Stopping workflow trigger scheduler");
        self.triggers.write().await.clear();
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| TriggerError::Scheduler(e.to_string()))
    }

    /// Register a trigger, replacing any trigger with the same id
    ///
    /// The workflow is validated now so a broken definition is rejected
    /// instead of failing at every firing.
    pub async fn register(&self, definition: TriggerDefinition) -> Result<TriggerInfo, TriggerError> {
        let trigger_id = definition.id.trim().to_string();
        if trigger_id.is_empty() {
            return Err(TriggerError::InvalidTrigger("trigger id must not be empty".to_string()));
        }

        let cron_expression = definition.schedule.to_cron()?;
        self.engine.validate(definition.workflow.clone())?;
        let workflow = Arc::new(definition.workflow);

        let job_engine = Arc::clone(&self.engine);
        let job_triggers = Arc::clone(&self.triggers);
        let job_trigger_id = trigger_id.clone();
        let job_workflow = Arc::clone(&workflow);

        let job = Job::new_async(cron_expression.as_str(), move |_uuid, _scheduler| {
            let engine = Arc::clone(&job_engine);
            let triggers = Arc::clone(&job_triggers);
            let trigger_id = job_trigger_id.clone();
            let workflow = Arc::clone(&job_workflow);

            Box::pin(async move {
                tracing::info!("🔔 Trigger '{}' fired", trigger_id);
                match fire(&engine, &triggers, &trigger_id, (*workflow).clone()).await {
                    Ok(response) => tracing::info!(
                        "✅ Triggered run {} for '{}' finished (success: {})",
                        response.run_id,
                        trigger_id,
                        response.success
                    ),
                    Err(e) => tracing::error!("❌ Triggered run for '{}' failed: {}", trigger_id, e),
                }
            })
        })
        .map_err(|e| TriggerError::InvalidSchedule(format!("'{}': {}", cron_expression, e)))?;

        self.remove_job(&trigger_id).await;

        let job_id = {
            let scheduler = self.scheduler.read().await;
            scheduler
                .add(job)
                .await
                .map_err(|e| TriggerError::Scheduler(e.to_string()))?
        };

        let registered = RegisteredTrigger {
            job_id,
            cron_expression,
            workflow,
            last_run: None,
        };
        let info = registered.info(&trigger_id);
        self.triggers.write().await.insert(trigger_id.clone(), registered);

        tracing::info!("📅 Registered trigger '{}' ({})", trigger_id, info.cron_expression);
        Ok(info)
    }

    /// Remove a trigger; false when it was not registered
    pub async fn unregister(&self, trigger_id: &str) -> bool {
        let removed = self.remove_job(trigger_id).await;
        if removed {
            tracing::info!("🗑️ Removed trigger '{}'", trigger_id);
        }
        removed
    }

    pub async fn get(&self, trigger_id: &str) -> Option<TriggerInfo> {
        self.triggers
            .read()
            .await
            .get(trigger_id)
            .map(|trigger| trigger.info(trigger_id))
    }

    pub async fn list(&self) -> Vec<TriggerInfo> {
        let triggers = self.triggers.read().await;
        let mut infos: Vec<TriggerInfo> = triggers.iter().map(|(id, t)| t.info(id)).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Run a registered trigger's workflow immediately, outside its schedule
    pub async fn run_now(&self, trigger_id: &str) -> Result<WorkflowResponse, TriggerError> {
        let workflow = self
            .triggers
            .read()
            .await
            .get(trigger_id)
            .map(|trigger| Arc::clone(&trigger.workflow))
            .ok_or_else(|| TriggerError::NotFound(trigger_id.to_string()))?;

        tracing::info!("▶️ Manually running trigger '{}'", trigger_id);
        Ok(fire(&self.engine, &self.triggers, trigger_id, (*workflow).clone()).await?)
    }

    async fn remove_job(&self, trigger_id: &str) -> bool {
        let Some(previous) = self.triggers.write().await.remove(trigger_id) else {
            return false;
        };
        let scheduler = self.scheduler.read().await;
        if let Err(e) = scheduler.remove(&previous.job_id).await {
            tracing::warn!("⚠️ Failed to remove job for trigger '{}': {}", trigger_id, e);
        }
        true
    }
}

impl std::fmt::Debug for TriggerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerService").finish_non_exhaustive()
    }
}

/// Execute one firing and record it as the trigger's last run
async fn fire(
    engine: &ExecutionEngine,
    triggers: &RwLock<HashMap<String, RegisteredTrigger>>,
    trigger_id: &str,
    workflow: Value,
) -> Result<WorkflowResponse, EngineError> {
    let outcome = engine.execute_workflow(workflow).await;

    let run = match &outcome {
        Ok(response) => TriggerRun {
            run_id: Some(response.run_id),
            success: response.success,
            error: response.errors.first().map(|e| format!("{}: {}", e.node_id, e.message)),
            finished_at: Utc::now(),
        },
        Err(e) => TriggerRun {
            run_id: None,
            success: false,
            error: Some(e.to_string()),
            finished_at: Utc::now(),
        },
    };

    if let Some(trigger) = triggers.write().await.get_mut(trigger_id) {
        trigger.last_run = Some(run);
    }

    outcome
}
