//! Instruction templates for the model-backed steps

use crate::core::config::ReceiptCategory;

pub const CONTRACT_RISK: &str = "You are a corporate legal expert reviewing contracts for risk. \
Analyze the legal risks in the contract text, covering payment and settlement terms, delivery \
and acceptance, liability for breach, intellectual property, confidentiality, governing law, \
dispute resolution and any other notable clauses.";

pub fn contract_risk_request(angle: &str, content: &str) -> String {
    format!(
        "Analyze the legal risks in the following contract from {} and give concrete, \
actionable recommendations with examples.\n\nContract:\n\n{}",
        angle, content
    )
}

pub const DEFAULT_ANALYSIS_ANGLE: &str = "the perspective of Party A";

pub fn employment_evaluation(dimensions: &[String]) -> String {
    let dimensions = dimensions
        .iter()
        .map(|d| format!("- {}", d))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are an HR expert familiar with labor contract law. Review the employment \
contract provided by the user along each of these dimensions:\n{}\n\n\
For each dimension assess the risk as one of \"none\", \"low\", \"medium\" or \"high\" and \
return only a JSON array of objects with the fields risk_level, dimension, risk_point and \
recommendation. Recommendations must cite the applicable law and say how to amend the clause. \
Missing or unclear clauses are at least \"medium\" risk.",
        dimensions
    )
}

pub const EMPLOYMENT_REPORT: &str = "You are an HR expert. From the structured review data \
supplied by the user, write a formal employment contract assessment report in markdown with \
these sections: purpose and scope, review dimensions and findings, detailed assessment of each \
dimension, overall conclusion, and recommended amendments. Mark any missing dimension as \
\"not provided\".";

pub fn default_review_dimensions() -> Vec<String> {
    [
        "Parties and basic information",
        "Contract term and probation period",
        "Job content and place of work",
        "Working hours and leave",
        "Remuneration",
        "Social insurance and benefits",
        "Labor protection and conditions",
        "Termination and dissolution",
        "Confidentiality and non-compete",
        "Liability for breach",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn receipt_categorizer(categories: &[ReceiptCategory]) -> String {
    let listing = categories
        .iter()
        .map(|c| format!("{}: {}", c.name, c.feature))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You classify receipt images. The supported receipt types are:\n{}\n\n\
Reply with exactly one type name from the list. If the image matches none of them reply \
with the single word unknown.",
        listing
    )
}

pub fn receipt_extractor(category: &ReceiptCategory) -> String {
    let rules = category
        .rules
        .iter()
        .map(|r| format!("- {}", r))
        .collect::<Vec<_>>()
        .join("\n");
    let fields = category
        .output_format
        .iter()
        .map(|(key, label)| format!("\"{}\": <{}>", key, label))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Extract the fields of this {} image.\nRules:\n{}\n\n\
Return only a JSON object of the form {{{}}}. Use an empty string for fields that are not \
visible.",
        category.name, rules, fields
    )
}

pub fn receipt_finalizer(category: &ReceiptCategory) -> String {
    let example = category
        .finalize_example
        .as_deref()
        .unwrap_or("| Field | Value |\n|---|---|\n| ... | ... |");
    format!(
        "Turn the receipt data supplied as JSON into a short markdown summary for the user. \
Follow this example:\n\n{}",
        example
    )
}

pub fn financial_data_answer(user_title: Option<&str>) -> String {
    format!(
        "You are the finance assistant of the company, speaking with {}. Answer using only \
the query result supplied by the user. If it says nothing was found, say so politely.",
        user_title.unwrap_or("a colleague")
    )
}

pub const PROMPT_OPTIMIZER: &str = "You improve prompts for an image generation model. Expand \
the user's request into one detailed prompt describing subject, style, composition, lighting \
and colour. Reply with the prompt only.";

pub const MEETING_SUMMARY: &str = "You write meeting minutes. From the transcript supplied by \
the user produce markdown minutes with a topic, attendees if mentioned, key discussion points, \
decisions and action items with owners.";

pub const RESUME_EXTRACTION: &str = "You are a recruiting assistant. Extract the resume \
supplied by the user into a JSON object with the fields name, gender, age, \
years_of_experience, phone_number, email, school_name, enrollment_and_graduation_dates, major, \
degree, work_experience, certifications and awards. Reply with the JSON object only.";

pub const DEFAULT_SCORING_RULES: &str = "\
1. Higher degrees relative to the stated requirement score higher.
2. More relevant work experience scores higher.
3. Closer match between the applied and advertised position scores higher.
4. Expected salary inside the advertised range scores higher, lower within range is better.
5. Frequent job changes score lower.
6. More relevant certificates score higher.
7. Closer match between past duties and the job requirements scores higher.
8. Graduates of leading universities score higher.
9. Experience at well-known companies scores higher.
10. More complete resumes score higher.
Each rule scores from 1 to 10 with 6 as a pass, 100 in total.";

pub fn resume_scoring(rules: &str) -> String {
    format!(
        "You are a recruiting assistant screening resumes with these rules:\n{}\n\n\
Compare the <recruitment> and <resume> sections supplied by the user. Reply with only a JSON \
object holding one score per rule, the total in resume_rating and a short justification per \
rule followed by a summary in evaluate_results.",
        rules
    )
}

pub fn resume_scoring_request(recruitment: &str, resume: &str) -> String {
    format!(
        "<recruitment>{}</recruitment><resume>{}</resume>",
        recruitment, resume
    )
}

const RECRUITMENT_FIELDS: &str = "job_title, salary, work_experience, work_location, \
educational_requirements, company_benefits, job_responsibilities and job_requirements";

pub fn recruitment_generation() -> String {
    format!(
        "You are the recruiting assistant of the company's HR department. Write a structured \
job posting from the user's request as a JSON object with the fields {}. Reply with the JSON \
object only.",
        RECRUITMENT_FIELDS
    )
}

pub fn recruitment_optimization() -> String {
    format!(
        "You are the recruiting assistant of the company's HR department. Improve the job \
posting in <recruitment_info> according to the request in <requirements>. Keep the fields {} \
and reply with the JSON object only.",
        RECRUITMENT_FIELDS
    )
}

pub fn recruitment_optimization_request(posting: &str, request: &str) -> String {
    format!(
        "<recruitment_info>{}</recruitment_info><requirements>{}</requirements>",
        posting, request
    )
}

pub const RECRUITMENT_MARKDOWN: &str = "Turn the job posting supplied as JSON into a markdown \
document with one second-level heading per field: job title, salary, work experience, work \
location, education, benefits, responsibilities and requirements.";

pub const INTERVIEW_RESUME_EXTRACTION: &str = "You extract candidate profiles for interview \
planning. Reply with only a JSON object with the fields name, background (education: list of \
{school, major, degree, duration}; work_experience: list of {company, position, duration}), \
project_experience (list of {name, description, responsibilities, outcomes}), ability, \
core_strengths, matching_points and highest_education.";

pub const INTERVIEW_JD_EXTRACTION: &str = "You extract job descriptions for interview \
planning. Reply with only a JSON object with the fields name, description and requirements \
(responsibilities, conditions and qualities, each a list of strings).";

pub fn interview_questions(description: &str, requirements: &str, projects: &str, ability: &str) -> String {
    format!(
        "You are an interviewer preparing questions for a candidate.\n\
Job description: {}\nJob requirements: {}\nCandidate projects: {}\nCandidate abilities: {}\n\n\
Reply with only a JSON object with the lists technical_questions, project_questions and \
q_and_a_questions, each entry being {{question, purpose}}.",
        description, requirements, projects, ability
    )
}

pub const INTERVIEW_QUESTIONS_REQUEST: &str = "Generate the interview questions, five of every type.";

pub fn hr_assistant(user_title: Option<&str>) -> String {
    format!(
        "You are the HR assistant of the company, speaking with {}. Answer questions about \
HR policy, positions, department heads and attendance. Use the tools when the answer depends \
on company data and never invent policy.",
        user_title.unwrap_or("a colleague")
    )
}

pub fn finance_assistant(user_title: Option<&str>) -> String {
    format!(
        "You are the finance assistant of the company, speaking with {}. Answer questions \
about reimbursement and finance policy using the policy search tool, and cite the sources \
it returns.",
        user_title.unwrap_or("a colleague")
    )
}

pub fn legal_assistant(user_title: Option<&str>) -> String {
    format!(
        "You are the corporate legal assistant of the company, speaking with {}. When the \
user supplies a contract link, review it with the contract review tool from the perspective \
they ask for, and summarize the main risks.",
        user_title.unwrap_or("a colleague")
    )
}

/// Custom instructions may reference `{user_title}`
pub fn render_instructions(template: &str, user_title: Option<&str>) -> String {
    template.replace("{user_title}", user_title.unwrap_or("a colleague"))
}
