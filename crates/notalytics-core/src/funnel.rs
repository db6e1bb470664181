//! Conversion funnel definitions and per-step metrics.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::analytics::{FunnelReport, FunnelStepMetric};
use crate::error::CoreError;
use crate::event::{non_blank, Event, PAGEVIEW};
use crate::rollups::{percent_of, round_one_decimal};
use crate::sessions::Visitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    Awareness,
    Conversion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStepDefinition {
    pub name: String,
    pub event_type: String,
    /// Page path the matching event must also carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    pub category: StepCategory,
}

impl FunnelStepDefinition {
    pub fn new(name: &str, event_type: &str, category: StepCategory) -> Self {
        Self {
            name: name.to_string(),
            event_type: event_type.to_string(),
            qualifier: None,
            category,
        }
    }

    pub fn with_qualifier(mut self, page_path: &str) -> Self {
        self.qualifier = Some(page_path.to_string());
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if event.event_type != self.event_type {
            return false;
        }
        match non_blank(self.qualifier.as_deref()) {
            Some(path) => event.page() == Some(path),
            None => true,
        }
    }
}

/// A validated, non-empty, ordered list of funnel steps. Index 0 is the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FunnelStepDefinition>", into = "Vec<FunnelStepDefinition>")]
pub struct FunnelDefinition {
    steps: Vec<FunnelStepDefinition>,
}

impl FunnelDefinition {
    pub fn new(steps: Vec<FunnelStepDefinition>) -> Result<Self, CoreError> {
        if steps.is_empty() {
            return Err(CoreError::InvalidFunnel(
                "a funnel needs at least one step".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for (idx, step) in steps.iter().enumerate() {
            if step.name.trim().is_empty() || step.event_type.trim().is_empty() {
                return Err(CoreError::InvalidFunnel(format!(
                    "step {idx} must have a name and an event_type"
                )));
            }
            if !names.insert(step.name.trim()) {
                return Err(CoreError::InvalidFunnel(format!(
                    "duplicate step name: {}",
                    step.name
                )));
            }
        }
        Ok(Self { steps })
    }

    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The notarization order flow tracked by the admin console.
    pub fn notarization_default() -> Self {
        use StepCategory::{Awareness, Conversion};
        Self {
            steps: vec![
                FunnelStepDefinition::new("Visited site", PAGEVIEW, Awareness),
                FunnelStepDefinition::new("Viewed services", PAGEVIEW, Awareness)
                    .with_qualifier("/services"),
                FunnelStepDefinition::new("Opened order form", "form_opened", Awareness),
                FunnelStepDefinition::new("Selected services", "services_selected", Conversion),
                FunnelStepDefinition::new("Uploaded documents", "documents_uploaded", Conversion),
                FunnelStepDefinition::new("Started checkout", "checkout_started", Conversion),
                FunnelStepDefinition::new("Completed purchase", "purchase", Conversion),
            ],
        }
    }

    pub fn steps(&self) -> &[FunnelStepDefinition] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Indices of every step `event` satisfies.
    pub fn matching_steps<'s>(&'s self, event: &'s Event) -> impl Iterator<Item = usize> + 's {
        self.steps
            .iter()
            .enumerate()
            .filter(move |(_, step)| step.matches(event))
            .map(|(idx, _)| idx)
    }
}

impl TryFrom<Vec<FunnelStepDefinition>> for FunnelDefinition {
    type Error = CoreError;

    fn try_from(steps: Vec<FunnelStepDefinition>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}

impl From<FunnelDefinition> for Vec<FunnelStepDefinition> {
    fn from(definition: FunnelDefinition) -> Self {
        definition.steps
    }
}

/// Nearest step before `index` with non-zero reach, or step 0 when every
/// earlier step is empty. `index` must be greater than zero.
pub fn baseline_index(reach: &[u64], index: usize) -> usize {
    let mut prior = index.saturating_sub(1);
    while prior > 0 && reach[prior] == 0 {
        prior -= 1;
    }
    prior
}

pub fn compute_funnel<'v, 'a: 'v>(
    definition: &FunnelDefinition,
    visitors: impl IntoIterator<Item = &'v Visitor<'a>>,
) -> FunnelReport {
    let step_count = definition.len();
    let mut reach = vec![0u64; step_count];
    let mut stalled = vec![0u64; step_count];

    for visitor in visitors {
        // Each visitor contributes at most once per step.
        for (idx, slot) in reach.iter_mut().enumerate() {
            if visitor.has_reached(idx) {
                *slot += 1;
            }
        }
        if let Some(furthest) = visitor.furthest_step() {
            if let Some(slot) = stalled.get_mut(furthest) {
                *slot += 1;
            }
        }
    }

    let steps = definition
        .steps()
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            let (conversion_rate, drop_off_rate, baseline) = if idx == 0 {
                (100.0, 0.0, 0)
            } else {
                let baseline = baseline_index(&reach, idx);
                let conversion = if reach[baseline] == 0 {
                    0.0
                } else {
                    percent_of(reach[idx], reach[baseline])
                };
                (conversion, round_one_decimal(100.0 - conversion), baseline)
            };
            FunnelStepMetric {
                index: idx,
                name: step.name.clone(),
                category: step.category,
                unique_visitors: reach[idx],
                conversion_rate,
                drop_off_rate,
                baseline_index: baseline,
                stalled_visitors: stalled[idx],
            }
        })
        .collect();

    let entered = reach.first().copied().unwrap_or(0);
    let completed = reach.last().copied().unwrap_or(0);
    FunnelReport {
        entered,
        overall_conversion_rate: if entered == 0 {
            0.0
        } else {
            percent_of(completed, entered)
        },
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::reconstruct;

    fn event(visitor: &str, event_type: &str, page: Option<&str>) -> Event {
        Event {
            visitor_id: Some(visitor.to_string()),
            session_id: Some(format!("s_{visitor}")),
            event_type: event_type.to_string(),
            page_path: page.map(str::to_string),
            ..Default::default()
        }
    }

    fn three_step_funnel() -> FunnelDefinition {
        FunnelDefinition::new(vec![
            FunnelStepDefinition::new("started", "started", StepCategory::Awareness),
            FunnelStepDefinition::new(
                "services_selected",
                "services_selected",
                StepCategory::Conversion,
            ),
            FunnelStepDefinition::new("purchase", "purchase", StepCategory::Conversion),
        ])
        .expect("valid funnel")
    }

    fn report_for(events: &[Event], funnel: &FunnelDefinition) -> FunnelReport {
        let reconstruction = reconstruct(events.iter(), funnel);
        compute_funnel(funnel, reconstruction.visitors.values())
    }

    #[test]
    fn zero_reach_intermediate_step_is_skipped() {
        let funnel = three_step_funnel();
        let mut events = Vec::new();
        for i in 0..10 {
            events.push(event(&format!("v{i}"), "started", None));
        }
        for i in 0..4 {
            events.push(event(&format!("v{i}"), "purchase", None));
        }

        let report = report_for(&events, &funnel);
        assert_eq!(report.steps[0].unique_visitors, 10);
        assert_eq!(report.steps[1].unique_visitors, 0);
        assert_eq!(report.steps[2].unique_visitors, 4);
        assert_eq!(report.steps[2].baseline_index, 0);
        assert_eq!(report.steps[2].conversion_rate, 40.0);
        assert_eq!(report.steps[2].drop_off_rate, 60.0);
        assert_eq!(report.steps[1].conversion_rate, 0.0);
        assert_eq!(report.steps[1].drop_off_rate, 100.0);
        assert_eq!(report.overall_conversion_rate, 40.0);
    }

    #[test]
    fn repeated_events_count_once() {
        let funnel = three_step_funnel();
        let events = vec![
            event("a", "started", None),
            event("a", "started", None),
            event("a", "started", None),
        ];
        let report = report_for(&events, &funnel);
        assert_eq!(report.steps[0].unique_visitors, 1);
        assert_eq!(report.entered, 1);
    }

    #[test]
    fn first_step_is_always_one_hundred_percent() {
        let funnel = three_step_funnel();
        let report = report_for(&[], &funnel);
        assert_eq!(report.steps[0].conversion_rate, 100.0);
        assert_eq!(report.steps[0].drop_off_rate, 0.0);
        for step in &report.steps[1..] {
            assert_eq!(step.conversion_rate, 0.0);
            assert_eq!(step.drop_off_rate, 100.0 - step.conversion_rate);
        }
        assert_eq!(report.overall_conversion_rate, 0.0);
    }

    #[test]
    fn conversion_uses_one_decimal() {
        let funnel = three_step_funnel();
        let mut events = Vec::new();
        for i in 0..3 {
            events.push(event(&format!("v{i}"), "started", None));
        }
        events.push(event("v0", "services_selected", None));

        let report = report_for(&events, &funnel);
        assert_eq!(report.steps[1].conversion_rate, 33.3);
        assert_eq!(report.steps[1].drop_off_rate, 66.7);
    }

    #[test]
    fn lower_index_event_after_higher_does_not_regress_progress() {
        let funnel = three_step_funnel();
        let events = vec![
            event("a", "started", None),
            event("a", "purchase", None),
            event("a", "started", None),
        ];
        let report = report_for(&events, &funnel);
        assert_eq!(report.steps[2].stalled_visitors, 1);
        assert_eq!(report.steps[0].stalled_visitors, 0);
    }

    #[test]
    fn qualifier_restricts_matching_page() {
        let step = FunnelStepDefinition::new("Viewed services", PAGEVIEW, StepCategory::Awareness)
            .with_qualifier("/services");
        assert!(step.matches(&event("a", PAGEVIEW, Some("/services"))));
        assert!(!step.matches(&event("a", PAGEVIEW, Some("/about"))));
        assert!(!step.matches(&event("a", PAGEVIEW, None)));
    }

    #[test]
    fn baseline_search_walks_back_to_entry() {
        assert_eq!(baseline_index(&[5, 0, 0, 2], 3), 0);
        assert_eq!(baseline_index(&[5, 3, 0, 2], 3), 1);
        assert_eq!(baseline_index(&[0, 0, 2], 2), 0);
        assert_eq!(baseline_index(&[5, 3], 1), 0);
    }

    #[test]
    fn definition_rejects_empty_and_duplicates() {
        assert!(FunnelDefinition::new(vec![]).is_err());
        let dup = vec![
            FunnelStepDefinition::new("a", "x", StepCategory::Awareness),
            FunnelStepDefinition::new("a", "y", StepCategory::Conversion),
        ];
        assert!(FunnelDefinition::new(dup).is_err());
    }

    #[test]
    fn definition_loads_from_json() {
        let raw = r#"[
            {"name": "Visited", "event_type": "pageview", "category": "awareness"},
            {"name": "Paid", "event_type": "purchase", "qualifier": "/checkout", "category": "conversion"}
        ]"#;
        let funnel = FunnelDefinition::from_json(raw).expect("parse funnel");
        assert_eq!(funnel.len(), 2);
        assert_eq!(funnel.steps()[1].qualifier.as_deref(), Some("/checkout"));

        assert!(FunnelDefinition::from_json("[]").is_err());
    }

    #[test]
    fn default_funnel_is_valid() {
        let funnel = FunnelDefinition::notarization_default();
        let rebuilt = FunnelDefinition::new(funnel.steps().to_vec()).expect("valid default");
        assert_eq!(rebuilt.len(), 7);
        assert_eq!(rebuilt.steps()[0].event_type, PAGEVIEW);
    }
}
