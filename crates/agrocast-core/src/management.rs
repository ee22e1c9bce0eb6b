//! Stage-triggered management alerts.
//!
//! Each [`ManagementRule`] fires the first day the published stage equals
//! its trigger stage, and never again in the same run. The reported date is
//! the trigger day shifted by the rule's offset, which may place it before
//! the trigger day.

use std::collections::BTreeSet;

use agrocast_types::{AlertMessage, MessageId};
use chrono::{NaiveDate, TimeDelta};
use tracing::debug;

use crate::bus::Signal;
use crate::component::{IntegrateContext, RateContext, SimulationComponent};
use crate::error::SimulationError;
use crate::registry::ComponentId;
use crate::rules::ManagementRule;

/// One-shot management triggers for a run.
#[derive(Debug, Clone, Default)]
pub struct ManagementAlertEngine {
    rules: Vec<ManagementRule>,
    fired: BTreeSet<MessageId>,
}

impl ManagementAlertEngine {
    /// Build an engine over `rules`, evaluated in the given order.
    pub const fn new(rules: Vec<ManagementRule>) -> Self {
        Self {
            rules,
            fired: BTreeSet::new(),
        }
    }

    /// The configured rules.
    pub fn rules(&self) -> &[ManagementRule] {
        &self.rules
    }

    /// Whether `id` has already fired this run.
    pub fn has_fired(&self, id: MessageId) -> bool {
        self.fired.contains(&id)
    }
}

fn reported_day(day: NaiveDate, offset_days: i32) -> Result<NaiveDate, SimulationError> {
    TimeDelta::try_days(i64::from(offset_days))
        .and_then(|offset| day.checked_add_signed(offset))
        .ok_or(SimulationError::DateOverflow { day })
}

impl SimulationComponent for ManagementAlertEngine {
    fn component_id(&self) -> ComponentId {
        ComponentId::ManagementAlerts
    }

    fn compute_rate(&mut self, _ctx: &RateContext<'_>) -> Result<(), SimulationError> {
        Ok(())
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), SimulationError> {
        let stage = ctx.registry.current_stage()?.clone();
        for rule in &self.rules {
            if rule.stage != stage || self.fired.contains(&rule.message_id) {
                continue;
            }
            self.fired.insert(rule.message_id);
            let alert = AlertMessage {
                day: reported_day(ctx.day, rule.offset_days)?,
                message_id: rule.message_id,
                message: rule.message.clone(),
            };
            debug!(
                day = %ctx.day,
                stage = %stage,
                reported = %alert.day,
                message_id = %rule.message_id,
                "management alert"
            );
            ctx.raise(&Signal::ManagementAlert {
                trigger_day: ctx.day,
                alert,
            })?;
        }
        Ok(())
    }
}
