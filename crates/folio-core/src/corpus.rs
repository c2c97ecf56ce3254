//! Knowledge corpus builder: turns the structured profile into topic-scoped text documents
//! for the retrieval index.
//!
//! Filenames depend only on the profile, so rebuilding from unchanged data yields the same
//! document set.

use crate::profile::PortfolioProfile;
use serde::{Deserialize, Serialize};

/// One plain-text document destined for the retrieval index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub filename: String,
    pub content: String,
}

impl KnowledgeDocument {
    fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Lowercase, whitespace runs to `_`, anything outside `[a-z0-9_]` dropped.
pub fn topic_key(title: &str) -> String {
    let mut key = String::with_capacity(title.len());
    let mut pending_sep = false;
    for c in title.trim().chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            pending_sep = !key.is_empty();
            continue;
        }
        if !(c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        if pending_sep {
            key.push('_');
            pending_sep = false;
        }
        key.push(c);
    }
    key
}

/// Build the full corpus. Order is stable; filenames are unique (a colliding topic key gets a
/// numeric suffix).
pub fn build_corpus(profile: &PortfolioProfile) -> Vec<KnowledgeDocument> {
    let mut docs = vec![
        personal_info(profile),
        about_journey(profile),
        projects_overview(profile),
    ];
    docs.extend(profile.projects.iter().map(|p| project_document(profile, p)));
    docs.extend(profile.skills.iter().map(|c| skill_document(profile, c)));
    docs.push(skills_summary(profile));
    docs.push(portfolio_overview(profile));
    dedupe_filenames(docs)
}

fn dedupe_filenames(docs: Vec<KnowledgeDocument>) -> Vec<KnowledgeDocument> {
    let mut seen = std::collections::HashSet::new();
    docs.into_iter()
        .map(|mut doc| {
            if !seen.insert(doc.filename.clone()) {
                let stem = doc.filename.trim_end_matches(".txt").to_string();
                let mut n = 2;
                while !seen.insert(format!("{}_{}.txt", stem, n)) {
                    n += 1;
                }
                doc.filename = format!("{}_{}.txt", stem, n);
            }
            doc
        })
        .collect()
}

fn bullet_list(items: &[String], indent: &str) -> String {
    items
        .iter()
        .map(|s| format!("{}- {}", indent, s))
        .collect::<Vec<_>>()
        .join("\n")
}

fn personal_info(profile: &PortfolioProfile) -> KnowledgeDocument {
    let p = &profile.personal;
    KnowledgeDocument::new(
        "personal_info.txt",
        format!(
            "Name: {}\nProfession: {}\nTagline: {}\nSpecialty: {}\n\n\
             Contact Information:\n- Email: {}\n- LinkedIn: {}\n- GitHub: {}\n- Instagram: {}\n\n\
             For any inquiries or collaboration opportunities, please reach out via LinkedIn or email.",
            p.name, p.profession, p.tagline, p.specialty, p.email, p.linkedin, p.github, p.instagram
        ),
    )
}

fn about_journey(profile: &PortfolioProfile) -> KnowledgeDocument {
    let a = &profile.about;
    let r = &profile.repositories;
    KnowledgeDocument::new(
        "about_journey.txt",
        format!(
            "About {}\n\nExperience: {}\n\nProfessional Journey:\n{}\n\nEducation:\n{}\n\n\
             Philosophy:\n{}\n\nGitHub Repositories:\n- Main Profile: {}\n\
             - Web Development Projects: {}\n- Agentic AI Projects: {}",
            profile.personal.name,
            a.experience,
            a.journey,
            bullet_list(&a.education, ""),
            a.philosophy,
            r.main,
            r.web_projects,
            r.agentic_ai
        ),
    )
}

fn projects_overview(profile: &PortfolioProfile) -> KnowledgeDocument {
    let entries = profile
        .projects
        .iter()
        .enumerate()
        .map(|(idx, p)| {
            let mut entry = format!(
                "{}. {}\n   Category: {}\n   Description: {}\n   Technologies: {}",
                idx + 1,
                p.title,
                p.category,
                p.description,
                p.tech.join(", ")
            );
            if let Some(link) = &p.link {
                entry.push_str(&format!("\n   Link: {}", link));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    KnowledgeDocument::new(
        "projects_overview.txt",
        format!(
            "Portfolio Projects\n\n{} has built {} major projects across AI, Web Development, and Agentic AI domains.\n\n{}",
            profile.personal.name,
            profile.projects.len(),
            entries
        ),
    )
}

fn project_document(profile: &PortfolioProfile, project: &crate::profile::Project) -> KnowledgeDocument {
    let link = project
        .link
        .as_deref()
        .map(|l| format!("\n\nProject Link: {}", l))
        .unwrap_or_default();
    let highlights = project
        .tech
        .iter()
        .take(2)
        .cloned()
        .collect::<Vec<_>>()
        .join(" and ");
    KnowledgeDocument::new(
        format!("project_{}.txt", topic_key(&project.title)),
        format!(
            "Project: {}\n\nCategory: {}\n\nDescription:\n{}\n\nTechnologies Used:\n{}{}\n\n\
             This project demonstrates {}'s expertise in {}.",
            project.title,
            project.category,
            project.description,
            bullet_list(&project.tech, ""),
            link,
            profile.personal.name,
            highlights
        ),
    )
}

fn skill_document(profile: &PortfolioProfile, category: &crate::profile::SkillCategory) -> KnowledgeDocument {
    KnowledgeDocument::new(
        format!("skills_{}.txt", topic_key(&category.title)),
        format!(
            "{} Skills\n\n{} is proficient in the following {} technologies:\n\n{}\n\n\
             These skills have been developed through {} of hands-on experience and continuous learning.",
            category.title,
            profile.personal.name,
            category.title.to_lowercase(),
            bullet_list(&category.skills, ""),
            profile.about.experience
        ),
    )
}

fn skills_summary(profile: &PortfolioProfile) -> KnowledgeDocument {
    let sections = profile
        .skills
        .iter()
        .map(|c| format!("{}:\n{}", c.title, bullet_list(&c.skills, "  ")))
        .collect::<Vec<_>>()
        .join("\n\n");
    KnowledgeDocument::new(
        "skills_summary.txt",
        format!(
            "Technical Skills Summary\n\n{} possesses a comprehensive skill set across multiple domains:\n\n{}\n\n\
             With {} of experience, {} continues to expand their expertise in AI, full-stack development, and cloud technologies.",
            profile.personal.name,
            sections,
            profile.about.experience,
            profile.personal.name
        ),
    )
}

fn portfolio_overview(profile: &PortfolioProfile) -> KnowledgeDocument {
    let p = &profile.personal;
    let projects = profile
        .projects
        .iter()
        .map(|pr| format!("- {}: {}", pr.title, pr.description))
        .collect::<Vec<_>>()
        .join("\n");
    let expertise = profile
        .skills
        .iter()
        .map(|c| format!("{}: {}", c.title, c.skills.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");
    KnowledgeDocument::new(
        "portfolio_overview.txt",
        format!(
            "{name} - Portfolio Overview\n\n{name} is a {profession} with {experience} of experience.\n\n{tagline}\n\n\
             Specialty: {specialty}\n\nProfessional Background:\n{journey}\n\nKey Projects:\n{projects}\n\n\
             Technical Expertise:\n{expertise}\n\nContact:\n- LinkedIn: {linkedin}\n- GitHub: {github}\n- Email: {email}\n\n\
             Philosophy:\n{philosophy}",
            name = p.name,
            profession = p.profession,
            experience = profile.about.experience,
            tagline = p.tagline,
            specialty = p.specialty,
            journey = profile.about.journey,
            projects = projects,
            expertise = expertise,
            linkedin = p.linkedin,
            github = p.github,
            email = p.email,
            philosophy = profile.about.philosophy,
        ),
    )
}
