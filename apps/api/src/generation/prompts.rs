// All LLM prompt constants for the Generation module.
// System prompts may be overridden from settings; the user prompt templates
// are always built here.

/// Default system prompt for structured resume generation.
pub const DEFAULT_RESUME_PROMPT: &str = r#"You are an expert Resume Writer and ATS Optimization Specialist.
Your goal is to rewrite the user's resume content to perfectly match the Job Description (JD).
Output MUST be valid JSON matching the structure below.

CRITICAL INSTRUCTION FOR LATEX:
- You are generating content for a LaTeX template.
- You MUST escape strict LaTeX special characters in your text fields.
- Replace '%' with '\%'
- Replace '&' with '\&'
- Replace '$' with '\$'
- Replace '#' with '\#'
- Replace '_' with '\_'
- Do not use markdown bold/italic (** or *) inside the strings, use LaTeX commands like \textbf{} if absolutely necessary, but prefer plain text.

JSON Structure:
{
    "name": "Full Name",
    "contact_info": "Phone | Email | LinkedIn",
    "summary": "3-5 sentence professional summary optimized for the JD keywords.",
    "skills": ["Skill 1", "Skill 2", "Skill 3"],
    "experience": [
        {
            "role": "Job Title",
            "company": "Company Name",
            "dates": "Date Range",
            "description": ["Action verb bullet 1...", "Bullet 2..."]
        }
    ],
    "education": [
        {
            "degree": "Degree Name",
            "institution": "University Name",
            "year": "Year"
        }
    ]
}"#;

/// Default system prompt for repairing LaTeX that failed to compile.
pub const DEFAULT_FIX_PROMPT: &str = "You are a LaTeX Debugging Expert.
Your goal is to FIX the broken LaTeX code based on the provided error log.
OUTPUT ONLY THE FIXED LATEX CODE. NO MARKDOWN. NO EXPLANATIONS.

Rules:
1. Identify the error from the log (e.g., undefined control sequence, missing bracket).
2. Fix strictly the error. Do not rewrite the whole resume unless necessary.
3. Ensure all special characters (%, &, $, #, _) that cause the issue are escaped.
4. Return the complete, compilable LaTeX file content.
";

/// Default system prompt for filling a caller-supplied template.
pub const DEFAULT_CUSTOM_FILL_PROMPT: &str = "You are an expert Resume Writer and LaTeX Specialist. \
    Your goal is to fill the provided LaTeX template with the user's data, \
    optimized for the Job Description.";

// User prompts are built in a single `format!` pass so substituted text is
// never scanned for placeholders again.

/// Structured generation user prompt.
pub fn resume_prompt(job_description: &str, user_data: &str) -> String {
    format!(
        "JOB DESCRIPTION:
{job_description}

USER'S RAW DATA (Use this as base, but tailor to JD):
{user_data}

Generate the JSON resume content."
    )
}

/// Repair user prompt.
pub fn fix_prompt(source: &str, error_log: &str) -> String {
    format!(
        "BROKEN LATEX SOURCE:
{source}

ERROR LOG:
{error_log}

Please fix the LaTeX source. Output ONLY the fixed LaTeX code."
    )
}

/// Direct template fill user prompt.
pub fn custom_fill_prompt(job_description: &str, user_data: &str, template: &str) -> String {
    format!(
        r#"JOB DESCRIPTION:
{job_description}

USER DATA (JSON):
{user_data}

TARGET LATEX TEMPLATE:
{template}

INSTRUCTIONS:
1. Use the "TARGET LATEX TEMPLATE" structure exactly.
2. Replace all placeholder content (e.g., "Job Bullet Point", "Skill 1", "John Doe") with the provided "USER DATA".
3. Tailor the bullet points and summary to match the "JOB DESCRIPTION".
4. Escape all LaTeX special characters (%, &, $, #, _) in the injected content.
5. Output ONLY the filled LaTeX code. Do not output markdown or explanations."#
    )
}
