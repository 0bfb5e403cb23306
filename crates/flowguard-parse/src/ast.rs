use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timeout applied to a job that does not declare `timeout-minutes`.
pub const DEFAULT_TIMEOUT_MINUTES: i64 = 360;

/// Flat string-to-string mapping used for `env`, `with` and permission maps.
///
/// Ordered so that rule evaluation, and therefore the first violation
/// reported, is deterministic.
pub type StringMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    /// Trigger event name -> raw trigger configuration text.
    pub on: StringMap,
    pub permissions: StringMap,
    /// Job id -> job. A duplicated id keeps the last definition.
    pub jobs: BTreeMap<String, Job>,
    pub env: StringMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: Option<String>,
    pub runs_on: String,
    pub needs: Vec<String>,
    pub permissions: StringMap,
    pub steps: Vec<Step>,
    pub env: StringMap,
    pub if_condition: Option<String>,
    pub timeout_minutes: i64,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            name: None,
            runs_on: String::new(),
            needs: Vec::new(),
            permissions: StringMap::new(),
            steps: Vec::new(),
            env: StringMap::new(),
            if_condition: None,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: Option<String>,
    /// Action reference (`owner/repo@ref`, `./local`, `docker://image`).
    pub uses: Option<String>,
    /// Inline shell command.
    pub run: Option<String>,
    pub with: StringMap,
    pub env: StringMap,
    pub if_condition: Option<String>,
}

impl Workflow {
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Iterate over every step of every job, in job-id order.
    pub fn all_steps(&self) -> impl Iterator<Item = (&str, &Step)> {
        self.jobs
            .iter()
            .flat_map(|(id, job)| job.steps.iter().map(move |step| (id.as_str(), step)))
    }

    pub fn step_count(&self) -> usize {
        self.jobs.values().map(|j| j.steps.len()).sum()
    }
}

impl Step {
    /// A step with only a `run` command.
    pub fn run(command: impl Into<String>) -> Self {
        Self {
            run: Some(command.into()),
            ..Self::default()
        }
    }

    /// A step with only an action reference.
    pub fn uses(action: impl Into<String>) -> Self {
        Self {
            uses: Some(action.into()),
            ..Self::default()
        }
    }

    /// Human-readable label: the step name, else the action, else the command.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.uses.as_deref())
            .or(self.run.as_deref())
            .unwrap_or("<empty step>")
    }
}
