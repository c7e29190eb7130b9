use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NUMERICAL_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub question: String,
    #[serde(default = "default_marks")]
    pub marks: Decimal,
    #[serde(default)]
    pub negative_marks: Decimal,
    #[serde(flatten)]
    pub details: QuestionDetails,
}

fn default_marks() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionDetails {
    SingleChoice(SingleChoiceDetails),
    Numerical(NumericalDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleChoiceDetails {
    pub options: Vec<String>,
    pub correct_answer: i32,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericalDetails {
    pub correct_value: f64,
    pub tolerance: Option<f64>,
    pub explanation: Option<String>,
}

/// Student-facing rendering of a question: no answer key, no explanation.
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: &'static str,
    pub marks: Decimal,
    pub negative_marks: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Question {
    pub fn to_public(&self) -> PublicQuestion {
        let (question_type, options) = match &self.details {
            QuestionDetails::SingleChoice(sc) => ("single_choice", Some(sc.options.clone())),
            QuestionDetails::Numerical(_) => ("numerical", None),
        };
        PublicQuestion {
            id: self.id.clone(),
            question: self.question.clone(),
            question_type,
            marks: self.marks,
            negative_marks: self.negative_marks,
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_both_question_kinds() {
        let choice: Question = serde_json::from_value(json!({
            "id": "q1",
            "question": "2+2?",
            "marks": 4,
            "options": ["3", "4"],
            "correct_answer": 1,
            "explanation": "arithmetic"
        }))
        .unwrap();
        assert!(matches!(choice.details, QuestionDetails::SingleChoice(_)));
        assert_eq!(choice.marks, Decimal::from(4));
        assert_eq!(choice.negative_marks, Decimal::ZERO);

        let numerical: Question = serde_json::from_value(json!({
            "id": "q2",
            "question": "pi to two places",
            "correct_value": 3.14,
            "tolerance": 0.005
        }))
        .unwrap();
        assert!(matches!(numerical.details, QuestionDetails::Numerical(_)));
        assert_eq!(numerical.marks, Decimal::ONE);
    }

    #[test]
    fn public_view_drops_answer_key() {
        let q: Question = serde_json::from_value(json!({
            "id": "q1",
            "question": "2+2?",
            "options": ["3", "4"],
            "correct_answer": 1,
            "explanation": "arithmetic"
        }))
        .unwrap();
        let rendered = serde_json::to_value(q.to_public()).unwrap();
        assert!(rendered.get("correct_answer").is_none());
        assert!(rendered.get("explanation").is_none());
        assert_eq!(rendered["type"], "single_choice");
        assert_eq!(rendered["options"], json!(["3", "4"]));
    }
}
