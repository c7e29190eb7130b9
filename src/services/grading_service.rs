use crate::models::attempt::Score;
use crate::models::question::{Question, QuestionDetails, DEFAULT_NUMERICAL_TOLERANCE};
use crate::models::timing::{AnswerValue, QuestionAnswer};
use rust_decimal::Decimal;

pub struct GradingService;

impl GradingService {
    /// Grades `answers` in place against the answer key and returns the final score.
    ///
    /// Correct answers earn the question's marks, wrong ones lose its negative
    /// marks, unanswered questions count zero. Entries whose index has no
    /// question in the key are left ungraded.
    pub fn grade(questions: &[Question], total: Decimal, answers: &mut [QuestionAnswer]) -> Score {
        let mut obtained = Decimal::ZERO;

        for answer in answers.iter_mut() {
            let Some(question) = usize::try_from(answer.question_index)
                .ok()
                .and_then(|idx| questions.get(idx))
            else {
                continue;
            };

            let (is_correct, marks) = match answer.answer_value() {
                None => (None, Decimal::ZERO),
                Some(value) => {
                    if Self::is_correct(question, value) {
                        (Some(true), question.marks)
                    } else {
                        (Some(false), -question.negative_marks)
                    }
                }
            };

            answer.is_correct = is_correct;
            answer.marks_obtained = Some(marks);
            obtained += marks;
        }

        let percentage = if total > Decimal::ZERO {
            (obtained / total * Decimal::ONE_HUNDRED).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Score {
            obtained: Some(obtained),
            total,
            percentage: Some(percentage),
        }
    }

    fn is_correct(question: &Question, value: AnswerValue) -> bool {
        match (&question.details, value) {
            (QuestionDetails::SingleChoice(sc), AnswerValue::Selected(idx)) => idx == sc.correct_answer,
            (QuestionDetails::Numerical(num), AnswerValue::Numerical(v)) => {
                let tolerance = num.tolerance.unwrap_or(DEFAULT_NUMERICAL_TOLERANCE).abs();
                (v - num.correct_value).abs() <= tolerance
            }
            _ => false,
        }
    }
}
