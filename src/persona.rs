use crate::assistant_api::{AssistantApi, AssistantHandle, AssistantSpec};
use crate::config::OpenAIConfig;
use crate::error::Result;
use crate::models::Role;

const APPLICANT_INSTRUCTIONS: &str = "You are a chatbot for ADU permit discussions. Your role is that of an applicant \
advocating for an ADU permit by persuasively citing the city's ADU ordinance. \
For example, if asked, 'I'm preparing my application for an ADU permit. How does the ordinance justify an increased number of ADUs in my neighborhood?', \
you should respond with a persuasive argument such as: 'According to section 3.2 of the ADUHandbookUpdate.pdf, the ordinance allows...'. \
The uploaded documents include letters and ordinances, with the ADUHandbookUpdate.pdf (the statewide file) taking precedence over individual files. \
Whenever possible, provide specific citations to ordinance sections that support the permit application.";

const PLANNER_INSTRUCTIONS: &str = "You are a chatbot for ADU permit discussions. Your role is that of a city planner who is skeptical about an increased number of ADUs. \
Your responses should be antagonistic, highlighting potential negative impacts of ADUs and questioning the applicant's interpretation of the ordinance. \
For example, if asked, 'I'm preparing my application for an ADU permit. How does the ordinance justify an increased number of ADUs in my neighborhood?', \
you should respond with a critical counterargument such as: 'The ordinance in section 3.2 of the ADUHandbookUpdate.pdf is ambiguous and does not fully address community impacts.' \
The uploaded documents include letters and ordinances, with the ADUHandbookUpdate.pdf (the statewide file) taking precedence over individual files. \
Whenever possible, provide specific citations to ordinance sections that support your perspective.";

/// Fixed instruction text for a role
pub fn instructions_for(role: Role) -> &'static str {
    match role {
        Role::Applicant => APPLICANT_INSTRUCTIONS,
        Role::Planner => PLANNER_INSTRUCTIONS,
    }
}

/// Keeps the remote assistant's instructions in step with the selected role
#[derive(Debug, Clone)]
pub struct PersonaManager {
    assistant: AssistantHandle,
    current: Role,
}

impl PersonaManager {
    /// Create the remote assistant seeded with `role`'s instructions
    pub async fn provision(
        api: &dyn AssistantApi,
        settings: &OpenAIConfig,
        role: Role,
    ) -> Result<Self> {
        let spec = AssistantSpec {
            name: settings.assistant_name.clone(),
            model: settings.model.clone(),
            instructions: instructions_for(role).to_string(),
        };
        let assistant = api.create_assistant(&spec).await?;
        tracing::info!(assistant_id = %assistant.id, %role, "Provisioned assistant");
        Ok(Self {
            assistant,
            current: role,
        })
    }

    pub fn assistant(&self) -> &AssistantHandle {
        &self.assistant
    }

    pub fn current_role(&self) -> Role {
        self.current
    }

    /// Push new instructions when `selected` differs from the last reconciled
    /// role. Returns whether a remote update was made.
    pub async fn reconcile(&mut self, api: &dyn AssistantApi, selected: Role) -> Result<bool> {
        if selected == self.current {
            return Ok(false);
        }

        api.update_instructions(&self.assistant.id, instructions_for(selected))
            .await?;
        tracing::info!(
            assistant_id = %self.assistant.id,
            from = %self.current,
            to = %selected,
            "Switched assistant role"
        );
        self.current = selected;
        Ok(true)
    }
}
