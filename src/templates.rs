use crate::models::FormType;

pub const THEORY_QUESTIONS: &[(&str, &str)] = &[
    ("Q1", "Teacher comes to class on time and completes the syllabus"),
    ("Q2", "Teacher explains concepts clearly"),
    ("Q3", "Teacher is well prepared for each lecture"),
    ("Q4", "Teacher relates the subject to real world applications"),
    ("Q5", "Teacher encourages questions and discussion"),
    ("Q6", "Teacher is available for doubt solving outside class"),
    ("Q7", "Assignments and tests are evaluated fairly"),
    ("Q8", "Overall teaching effectiveness"),
];

pub const PRACTICAL_QUESTIONS: &[(&str, &str)] = &[
    ("Q1", "Teacher explains the aim and procedure before each practical"),
    ("Q2", "Teacher helps with debugging and lab equipment"),
    ("Q3", "Practicals are completed as per the schedule"),
    ("Q4", "Journals are checked regularly and fairly"),
    ("Q5", "Overall lab guidance"),
];

#[derive(Debug, Clone, Copy)]
pub struct QuestionTemplate {
    questions: &'static [(&'static str, &'static str)],
}

impl QuestionTemplate {
    pub fn for_form_type(form_type: FormType) -> Self {
        let questions = match form_type {
            FormType::Theory => THEORY_QUESTIONS,
            FormType::Practical => PRACTICAL_QUESTIONS,
        };
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn texts(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.questions.iter().map(|(_, text)| *text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_are_selected_by_form_type() {
        assert_eq!(
            QuestionTemplate::for_form_type(FormType::Theory).len(),
            THEORY_QUESTIONS.len()
        );
        assert_eq!(
            QuestionTemplate::for_form_type(FormType::Practical).len(),
            PRACTICAL_QUESTIONS.len()
        );
    }

    #[test]
    fn question_keys_are_sequential() {
        for template in [THEORY_QUESTIONS, PRACTICAL_QUESTIONS] {
            for (idx, (key, _)) in template.iter().enumerate() {
                assert_eq!(*key, format!("Q{}", idx + 1));
            }
        }
    }
}
