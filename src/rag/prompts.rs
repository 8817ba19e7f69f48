//! Learning-module prompt for a track

use crate::types::{GenerationRequest, Track};

/// Inputs of a track learning module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPrompt {
    pub track: Track,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub goals: Vec<String>,
}

impl TrackPrompt {
    pub fn new(track: Track, title: impl Into<String>, difficulty: impl Into<String>) -> Self {
        Self {
            track,
            title: title.into(),
            description: String::new(),
            difficulty: difficulty.into(),
            goals: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_goals(mut self, goals: Vec<String>) -> Self {
        self.goals = goals;
        self
    }

    /// Generation request for this module, scoped to its track when `use_rag`
    pub fn request(&self, model: &str, use_rag: bool) -> GenerationRequest {
        let request = GenerationRequest::new(model, self.render());
        if use_rag {
            request.with_track(self.track)
        } else {
            request
        }
    }

    /// Render the generation prompt
    pub fn render(&self) -> String {
        let mut header = format!("Topic: {}\n", self.title);
        if !self.description.trim().is_empty() {
            header.push_str(&format!("Description: {}\n", self.description.trim()));
        }
        header.push_str(&format!("Level: {}", self.difficulty));
        if !self.goals.is_empty() {
            header.push_str(&format!("\nLearner's goals: {}", self.goals.join(", ")));
        }

        format!(
            "Create a brief learning module for {context}.\n\n\
             {header}\n\n\
             Provide (250-300 words total):\n\n\
             1. INTRODUCTION (2-3 sentences)\n\
             - What this topic is and why it matters\n\n\
             2. KEY CONCEPTS (3-4 bullet points)\n\
             - Core ideas to understand\n\
             - Important terms\n\n\
             3. PRACTICAL EXAMPLE\n\
             - One real workplace scenario\n\n\
             4. QUICK TIPS (2-3 points)\n\
             - What to remember\n\
             - Common mistakes to avoid\n\n\
             Keep it clear, concise, and actionable for {difficulty} level learners.",
            context = self.track.context(),
            header = header,
            difficulty = self.difficulty,
        )
    }
}
