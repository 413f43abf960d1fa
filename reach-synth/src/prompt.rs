use reach_rules::SynthesisSchema;
use serde::{Deserialize, Serialize};

const RULES_EXAMPLE: &str = r#"{
  "id": "root",
  "combinator": "AND",
  "rules": [
    { "id": "rule-1", "field": "inactive_days", "operator": ">", "value": "180" },
    { "id": "rule-2", "field": "spend", "operator": ">=", "value": "5000" }
  ]
}"#;

/// Prompt asking the generator to turn `description` into a rule group.
pub fn rules_prompt(description: &str) -> String {
    let schema = serde_json::to_string_pretty(&SynthesisSchema.json_schema())
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are a CRM rule converter. Convert this description into a rule group: {description:?}\n\
         \n\
         Return ONLY a JSON object that validates against this JSON Schema:\n\
         {schema}\n\
         \n\
         Requirements:\n\
         1. Return only the JSON object, no other text.\n\
         2. The root id is \"root\"; rule ids are rule-1, rule-2 and so on.\n\
         3. Use only the listed fields and operators.\n\
         4. Every value is a string holding a whole number, e.g. \"100\" or \"5000\".\n\
         5. Choose AND or OR from the logic of the description.\n\
         \n\
         Example valid response:\n\
         {RULES_EXAMPLE}"
    )
}

/// Parameters for a marketing message suggestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRequest {
    pub objective: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub context: String,
}

pub fn message_prompt(request: &MessageRequest) -> String {
    let tone = if request.tone.trim().is_empty() {
        "friendly"
    } else {
        request.tone.trim()
    };
    format!(
        "Generate a marketing message for a CRM campaign with the following parameters:\n\
         Objective: {}\n\
         Tone: {}\n\
         Context: {}\n\
         \n\
         The message should:\n\
         1. Be personalized (use {{name}} for customer name)\n\
         2. Be concise and engaging\n\
         3. Include a clear call to action\n\
         4. Match the specified tone\n\
         5. Be relevant to the objective\n\
         \n\
         Generate the message in a natural, conversational style.",
        request.objective.trim(),
        tone,
        request.context.trim(),
    )
}
