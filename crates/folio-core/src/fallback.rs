//! Rule-based fallback responder.
//!
//! Used whenever grounded retrieval is unavailable: unconfigured backend, failed run, empty
//! stream, or a transport failure on the client. Pure and total.

/// One keyword category with its canned answer. Categories are checked in table order.
struct Rule {
    keywords: &'static [&'static str],
    response: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        keywords: &["skill", "tech", "stack", "language", "framework", "tool"],
        response: "Abdullah works across the stack: React, Next.js, TypeScript and Tailwind CSS on the \
                   frontend, Python, Node.js and FastAPI on the backend, and the OpenAI Agent SDK, \
                   Langfuse and N8N for AI work. Check the Skills section for the full list.",
    },
    Rule {
        keywords: &["project", "portfolio", "built", "work"],
        response: "Featured projects include an AI Assistant Dashboard, a multi-model AI Code \
                   Assistant and this portfolio website. The Projects section has links and details \
                   for each one.",
    },
    Rule {
        keywords: &["contact", "email", "reach", "hire", "linkedin"],
        response: "You can reach Abdullah through the contact form on this page, by email at \
                   muhammadabdullah51700@gmail.com, or on LinkedIn.",
    },
    Rule {
        keywords: &["experience", "background", "journey", "education", "learn"],
        response: "Abdullah has 2+ years of experience. He started with HTML, CSS and JavaScript, \
                   moved on to TypeScript, and now builds agentic AI systems after training at \
                   Panaversity and PIAIC.",
    },
    Rule {
        keywords: &["hello", "hi", "hey", "greetings"],
        response: "Hi there! Ask me about Abdullah's skills, projects, experience, or how to get in \
                   touch.",
    },
];

const GENERIC_RESPONSE: &str = "I'm not sure about that one. Try asking about skills, projects, \
                                experience, or how to get in touch, or use the contact form to ask \
                                Abdullah directly.";

/// Canned answer for `user_text`. Case-insensitive; first matching category wins.
pub fn fallback(user_text: &str) -> &'static str {
    let lower = user_text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| matches_keyword(&words, k)))
        .map(|rule| rule.response)
        .unwrap_or(GENERIC_RESPONSE)
}

/// Keywords match at the start of a word, so "skills" and "technologies" count but "network"
/// is not "work". Short ones ("hi") must be the whole word so "high" isn't a greeting.
fn matches_keyword(words: &[&str], keyword: &str) -> bool {
    if keyword.len() <= 3 {
        words.iter().any(|w| *w == keyword)
    } else {
        words.iter().any(|w| w.starts_with(keyword))
    }
}
