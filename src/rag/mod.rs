// Retrieval-augmented prompting
//
// - Retrieval: ranked track documents plus citation previews
// - Augment: fold references into the generation prompt
// - Prompts: track learning-module prompt
// - Quiz: multiple-choice question pulled out of a model reply

pub mod augment;
pub mod prompts;
pub mod quiz;
pub mod retrieval;

pub use augment::augment_prompt;
pub use prompts::TrackPrompt;
pub use quiz::{parse_quiz, quiz_prompt, QuizQuestion};
pub use retrieval::{preview, Retrieval, RetrievalPipeline};
