//! Prompt rendering for writing-task assessments.
//!
//! The remote agent is asked for four named criteria (band score, how to
//! improve, strengths) plus an overall score. Two reply shapes are supported:
//! a plain outline the agent echoes back as prose, and a JSON skeleton that
//! [`AssessmentReport::from_reply`] can decode.

use serde::{Deserialize, Serialize};

use crate::domain::assessment::TaskCategory;

const SHARED_CRITERIA: [&str; 3] =
    ["Coherence and Cohesion", "Lexical Resource", "Grammatical Range and Accuracy"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptFormat {
    #[default]
    Outline,
    Json,
}

impl std::str::FromStr for PromptFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "outline" => Ok(Self::Outline),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported prompt format `{other}` (expected outline|json)")),
        }
    }
}

/// Renders the outline prompt. Inputs are assumed validated by the caller.
pub fn build(category: TaskCategory, task_statement: &str, candidate_text: &str) -> String {
    build_with_format(PromptFormat::Outline, category, task_statement, candidate_text)
}

pub fn build_with_format(
    format: PromptFormat,
    category: TaskCategory,
    task_statement: &str,
    candidate_text: &str,
) -> String {
    match format {
        PromptFormat::Outline => outline_prompt(category, task_statement, candidate_text),
        PromptFormat::Json => json_prompt(category, task_statement, candidate_text),
    }
}

fn criteria(category: TaskCategory) -> [&'static str; 4] {
    let [second, third, fourth] = SHARED_CRITERIA;
    [category.primary_criterion(), second, third, fourth]
}

fn outline_prompt(category: TaskCategory, task_statement: &str, candidate_text: &str) -> String {
    let mut structure = String::from("Details:");
    for (index, name) in criteria(category).iter().enumerate() {
        structure.push_str(&format!(
            " {}) {name}: - Band score: - How to improve: - Strengths:",
            index + 1
        ));
    }
    structure.push_str(" Overall Score: Suggest Essay:");

    format!(
        "\n- You are tasked with evaluating and scoring IELTS writing task {number}. \
         Your goal is to provide detailed feedback and improvement advice to the student. \
         - Content of task is : ((( {task_statement} ))) \
         - Candidate response is: ((( {candidate_text} ))) \
         - I do not include chart. Please provide your evaluation based on given task. \
         Following below structure for returning: {structure}",
        number = category.number(),
    )
}

fn json_prompt(category: TaskCategory, task_statement: &str, candidate_text: &str) -> String {
    let details = criteria(category)
        .iter()
        .map(|name| Criterion {
            name: slug(name),
            band_score: String::new(),
            how_to_improve: String::new(),
            strengths: String::new(),
        })
        .collect::<Vec<_>>();
    let skeleton =
        AssessmentReport { details, overall_score: String::new(), suggest_essay: String::new() };
    let skeleton = serde_json::to_string_pretty(&skeleton).unwrap_or_default();

    let chart_note = match category {
        TaskCategory::Task1 => "I do not include chart. ",
        TaskCategory::Other(_) => "",
    };

    format!(
        "\nYou are IELTS teacher for assessing Writing Task {number}. \
         Please help provide assessment IELTS band score.\n\
         Given task is : {task_statement}\n\
         Candidate response is: {candidate_text}\n\
         {chart_note}Please provide your evaluation based on given task. \
         Following below json structure for returning:\n{skeleton}",
        number = category.number(),
    )
}

fn slug(name: &str) -> String {
    name.to_ascii_lowercase().replace(' ', "-")
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    #[serde(default)]
    pub band_score: String,
    #[serde(default)]
    pub how_to_improve: String,
    #[serde(default)]
    pub strengths: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub details: Vec<Criterion>,
    #[serde(default)]
    pub overall_score: String,
    #[serde(default)]
    pub suggest_essay: String,
}

impl AssessmentReport {
    /// Decodes the first JSON object embedded in a reply. Agents often wrap
    /// the object in prose or a code fence, so everything outside the outermost
    /// braces is ignored.
    pub fn from_reply(reply: &str) -> Option<Self> {
        let start = reply.find('{')?;
        let end = reply.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&reply[start..=end]).ok()
    }

    pub fn criterion(&self, name: &str) -> Option<&Criterion> {
        self.details.iter().find(|criterion| criterion.name == name)
    }
}
