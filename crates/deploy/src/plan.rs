//! Stack selection.
//!
//! The plan is resolved in a fixed order: DA layer first (other stacks read values it
//! produces), then the sequencer topology, then whether a full node is deployed.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{
    error::{DeployError, Result},
    prompt::Prompter,
};

/// A deployable unit with its own directory, environment file and compose descriptor.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum StackKind {
    DaCelestia,
    SingleSequencer,
    Fullnode,
}

impl StackKind {
    /// Name of the stack directory under `stacks/`.
    pub fn dir_name(&self) -> String {
        self.to_string()
    }

    /// Returns true for stacks that consume values produced by the DA stack.
    pub fn depends_on_da(&self) -> bool {
        !matches!(self, StackKind::DaCelestia)
    }
}

/// Supported data-availability layers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum DaLayer {
    Celestia,
}

impl DaLayer {
    pub fn stack(&self) -> StackKind {
        match self {
            DaLayer::Celestia => StackKind::DaCelestia,
        }
    }
}

/// Supported sequencer topologies.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum SequencerTopology {
    SingleSequencer,
}

impl SequencerTopology {
    pub fn stack(&self) -> StackKind {
        match self {
            SequencerTopology::SingleSequencer => StackKind::SingleSequencer,
        }
    }
}

/// The stacks selected for one run. Built once and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    /// The DA layer, if any.
    pub da: Option<DaLayer>,
    /// The sequencer topology.
    pub topology: SequencerTopology,
    /// Whether a full node is deployed next to the sequencer.
    pub fullnode: bool,
}

impl DeploymentPlan {
    pub fn new(da: Option<DaLayer>, topology: SequencerTopology, fullnode: bool) -> Self {
        Self {
            da,
            topology,
            fullnode,
        }
    }

    /// Returns true if the plan includes a DA layer.
    pub fn has_da(&self) -> bool {
        self.da.is_some()
    }

    /// The selected stacks in dependency order.
    pub fn stacks(&self) -> Vec<StackKind> {
        let mut stacks = Vec::with_capacity(3);
        if let Some(da) = self.da {
            stacks.push(da.stack());
        }
        stacks.push(self.topology.stack());
        if self.fullnode {
            stacks.push(StackKind::Fullnode);
        }
        stacks
    }
}

/// Non-interactive answers for the selection prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanArgs {
    /// The DA layer to deploy.
    #[serde(default)]
    pub da: Option<DaLayer>,
    /// Deploy without a DA layer.
    #[serde(default)]
    pub no_da: bool,
    /// The sequencer topology.
    #[serde(default)]
    pub topology: Option<SequencerTopology>,
    /// Whether to deploy a full node.
    #[serde(default)]
    pub fullnode: Option<bool>,
}

/// Resolve the deployment plan from arguments, prompting for anything missing.
///
/// Invalid answers are re-asked until a valid one is given. When no operator is
/// available, a missing argument fails with [`DeployError::NonInteractive`].
pub async fn select_plan(args: &PlanArgs, prompter: &mut Prompter) -> Result<DeploymentPlan> {
    let da = match (args.no_da, args.da) {
        (true, _) => None,
        (false, Some(da)) => Some(da),
        (false, None) => Some(choose::<DaLayer>(prompter, "DA layer", "--da or --no-da").await?),
    };

    let topology = match args.topology {
        Some(topology) => topology,
        None => choose::<SequencerTopology>(prompter, "sequencer topology", "--topology").await?,
    };

    let fullnode = match args.fullnode {
        Some(fullnode) => fullnode,
        None => ask_fullnode(prompter).await?,
    };

    let plan = DeploymentPlan::new(da, topology, fullnode);

    tracing::info!(
        da = ?plan.da.map(|da| da.to_string()),
        topology = %plan.topology,
        fullnode = plan.fullnode,
        "Deployment plan selected"
    );

    Ok(plan)
}

async fn choose<T>(prompter: &mut Prompter, choice: &'static str, flag: &'static str) -> Result<T>
where
    T: IntoEnumIterator + Display + Copy,
{
    let options: Vec<T> = T::iter().collect();
    let menu = options
        .iter()
        .enumerate()
        .map(|(i, option)| format!("  {}) {}", i + 1, option))
        .collect::<Vec<_>>()
        .join("\n");

    loop {
        let Some(input) = prompter
            .ask(&format!("Select the {choice}:\n{menu}\n>"))
            .await?
        else {
            return Err(DeployError::NonInteractive { choice, flag });
        };

        match parse_choice(&options, &input) {
            Some(option) => return Ok(option),
            None => recover(
                DeployError::InvalidSelection { choice, input },
                "please try again",
            )?,
        }
    }
}

/// Log a recoverable answer so the caller asks again; fatal errors are propagated.
fn recover(err: DeployError, hint: &str) -> Result<()> {
    if err.is_fatal() {
        return Err(err);
    }
    tracing::warn!("{err}, {hint}");
    Ok(())
}

/// Accepts either the 1-based menu index or the option name.
fn parse_choice<T: Display + Copy>(options: &[T], input: &str) -> Option<T> {
    let input = input.trim();
    if let Ok(index) = input.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| options.get(i))
            .copied();
    }

    options
        .iter()
        .find(|option| option.to_string().eq_ignore_ascii_case(input))
        .copied()
}

async fn ask_fullnode(prompter: &mut Prompter) -> Result<bool> {
    const CHOICE: &str = "full node";

    loop {
        let Some(input) = prompter.ask("Deploy a full node? [y/n]").await? else {
            return Err(DeployError::NonInteractive {
                choice: CHOICE,
                flag: "--fullnode or --no-fullnode",
            });
        };

        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => recover(
                DeployError::InvalidSelection {
                    choice: CHOICE,
                    input,
                },
                "please answer y or n",
            )?,
        }
    }
}
