//! Structured portfolio data: identity, projects, skills and history.
//!
//! The built-in profile is the default; a TOML file with the same shape replaces it.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub name: String,
    pub email: String,
    pub linkedin: String,
    pub github: String,
    pub instagram: String,
    pub profession: String,
    pub tagline: String,
    pub specialty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    pub description: String,
    pub tech: Vec<String>,
    #[serde(default)]
    pub link: Option<String>,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCategory {
    pub title: String,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct About {
    pub experience: String,
    pub journey: String,
    pub education: Vec<String>,
    pub philosophy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repositories {
    pub main: String,
    pub web_projects: String,
    pub agentic_ai: String,
}

/// Everything the knowledge corpus is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioProfile {
    pub personal: PersonalInfo,
    pub projects: Vec<Project>,
    pub skills: Vec<SkillCategory>,
    pub about: About,
    pub repositories: Repositories,
}

impl PortfolioProfile {
    /// Load a profile from a TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = std::fs::read_to_string(path)?;
        let profile: PortfolioProfile = toml::from_str(&content)?;
        Ok(profile)
    }

    /// Load from `path` when given, built-in profile otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(p) => match Self::load_from_path(p) {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!(
                        target: "folio::publish",
                        path = %p.display(),
                        "Profile file unreadable ({}); using built-in profile",
                        e
                    );
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for PortfolioProfile {
    fn default() -> Self {
        Self {
            personal: PersonalInfo {
                name: "Abdullah Malik".into(),
                email: "muhammadabdullah51700@gmail.com".into(),
                linkedin: "https://www.linkedin.com/in/muhammad-abdullah-athar".into(),
                github: "https://github.com/AbdullahMalik17".into(),
                instagram: "https://www.instagram.com/muhammadabdullah17337/".into(),
                profession: "Software Engineer and AI Enthusiast".into(),
                tagline: "Building the Future of AI One Line at a Time".into(),
                specialty: "Artificial Intelligence and Full-Stack Development".into(),
            },
            projects: vec![
                Project {
                    title: "AI Assistant Dashboard".into(),
                    description: "Intelligent dashboard with OpenAI integration for natural language processing and task automation.".into(),
                    tech: strings(&["Next.js", "OpenAI SDK", "Python"]),
                    link: Some("https://portfolio-ai-assistant-of-malik-five.vercel.app/".into()),
                    category: "AI/Web".into(),
                },
                Project {
                    title: "AI Code Assistant".into(),
                    description: "Multi AI Model code assistant that helps developers write, debug, and optimize code snippets.".into(),
                    tech: strings(&["OpenAI Agent SDK", "MEM0", "Python", "Chainlit", "Langfuse"]),
                    link: Some("https://github.com/AbdullahMalik17/Agentic_AI/tree/main/_Projects/Code_Assistant_agent".into()),
                    category: "Agentic AI".into(),
                },
                Project {
                    title: "Portfolio Website".into(),
                    description: "Modern, responsive portfolio website with smooth animations and dark mode support.".into(),
                    tech: strings(&["Next.js", "TypeScript", "Tailwind"]),
                    link: Some("https://github.com/AbdullahMalik17/Portfolio-AI-Assistant".into()),
                    category: "Web Development".into(),
                },
            ],
            skills: vec![
                SkillCategory {
                    title: "Frontend".into(),
                    skills: strings(&["React", "Next.js", "TypeScript", "Tailwind CSS", "HTML5/CSS3"]),
                },
                SkillCategory {
                    title: "Backend".into(),
                    skills: strings(&["Python", "Node.js", "FastAPI", "JavaScript", "Supabase"]),
                },
                SkillCategory {
                    title: "AI & ML".into(),
                    skills: strings(&["OpenAI Agent Sdk", "Langfuse", "N8N", "Google Framework", "OpenAI Agent Kit"]),
                },
                SkillCategory {
                    title: "Tools".into(),
                    skills: strings(&["Git", "Docker", "VS Code", "Figma", "AntiGravity", "Gemini CLI with Advanced MCP integration"]),
                },
            ],
            about: About {
                experience: "2+ years".into(),
                journey: "Started learning at 14 years old (10th class) with HTML, CSS, and JavaScript. \
                    Practiced for three months and created web development projects. Then learned TypeScript \
                    and moved on to Agentic AI Development from Panaversity. Learned how to make AI Agents using \
                    OpenAI Agent SDK, Python, and N8n. Currently learning OpenAI Agent Kit and Cloud technologies \
                    like Kubernetes and Docker.".into(),
                education: strings(&["Panaversity", "PIAIC"]),
                philosophy: "Creating seamless, intelligent experiences that make technology accessible and beneficial for everyone.".into(),
            },
            repositories: Repositories {
                main: "https://github.com/AbdullahMalik17/AbdullahMalik17".into(),
                web_projects: "https://github.com/AbdullahMalik17/Projects-of-html".into(),
                agentic_ai: "https://github.com/AbdullahMalik17/Agentic_AI/tree/main/_Projects".into(),
            },
        }
    }
}
