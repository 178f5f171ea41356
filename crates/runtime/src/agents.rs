//! Agent personas selectable per request.

use serde::Serialize;

/// A known agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AgentId {
    #[default]
    Default,
    Finance,
    Activity,
}

/// Static description of an agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    pub system_prompt: &'static str,
}

static DEFAULT: AgentProfile = AgentProfile {
    id: "agent_default",
    name: "General Assistant",
    description: "Default assistant with access to every club tool",
    system_prompt: "You are an AI assistant for the Club AI Hub. \
                    You must use tools to access club systems and data.",
};

static FINANCE: AgentProfile = AgentProfile {
    id: "agent_finance",
    name: "Finance Assistant",
    description: "Focused on reimbursements and budget approvals",
    system_prompt: "You are a Finance Assistant for the Club. \
                    Focus on budget, reimbursement, and financial data. \
                    Always verify amounts and receipt details.",
};

static ACTIVITY: AgentProfile = AgentProfile {
    id: "agent_activity",
    name: "Event Planner",
    description: "Helps plan club activities",
    system_prompt: "You are an Event Planner for the Club. \
                    Help members organize activities, check venues, and manage schedules.",
};

impl AgentId {
    pub const ALL: [AgentId; 3] = [Self::Default, Self::Finance, Self::Activity];

    /// Exact-match lookup; unknown or absent ids select the default agent.
    pub fn resolve(id: Option<&str>) -> Self {
        match id {
            Some("agent_default") => Self::Default,
            Some("agent_finance") => Self::Finance,
            Some("agent_activity") => Self::Activity,
            Some(_) | None => Self::Default,
        }
    }

    pub fn profile(self) -> &'static AgentProfile {
        match self {
            Self::Default => &DEFAULT,
            Self::Finance => &FINANCE,
            Self::Activity => &ACTIVITY,
        }
    }

    pub fn system_prompt(self) -> &'static str {
        self.profile().system_prompt
    }
}
