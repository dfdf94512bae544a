//! CI report

use shotdiff_common::protocol::{CiFailure, CiReport};

use crate::registry::{Registry, Scenario};

/// Summarise the registry: every scenario that differs from its baseline,
/// or `OK` when none does.
pub fn prepare_ci_report(registry: &Registry) -> CiReport {
    let scenarios: Vec<CiFailure> = registry
        .failing()
        .map(|scenario| CiFailure {
            name: scenario.name().to_string(),
            context: scenario.context().map(str::to_string),
            diff: text_diff(scenario),
        })
        .collect();

    if scenarios.is_empty() {
        CiReport::Ok
    } else {
        CiReport::NotOk { scenarios }
    }
}

/// Plain-text markup and style diff of a scenario
pub fn text_diff(scenario: &Scenario) -> String {
    let mut out = String::new();
    if let Some(diff) = &scenario.diff {
        out.push_str(&diff.to_unified());
    }
    if let Some(diff) = &scenario.diff_css {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&diff.to_unified());
    }
    out
}
