//! Instruction templates for the explanation generator.

use gloss_core::{ContextWindow, ExplainPrompt, Mode, ReadingLevel};

pub fn mode_instruction(mode: Mode) -> &'static str {
    match mode {
        Mode::Quick => {
            "Explain the highlighted passage in 2-4 sentences. Say what it means and why it \
             matters in this document. No preamble."
        }
        Mode::Breakdown => {
            "Break the highlighted passage into its parts. Use a short numbered list: one item \
             per claim, term, or step, each explained in a sentence or two. End with a one-line \
             summary."
        }
        Mode::Example => {
            "Explain the highlighted passage through one concrete, worked example that a reader \
             could follow step by step. Tie the example back to the passage's wording."
        }
        Mode::Assumptions => {
            "List the unstated assumptions and prerequisites the highlighted passage relies on. \
             For each, say why the passage needs it and what breaks if it does not hold."
        }
    }
}

pub fn level_instruction(level: ReadingLevel) -> &'static str {
    match level {
        ReadingLevel::Middle => {
            "Write for a middle-school reader: short sentences, everyday words, define any \
             technical term the first time it appears."
        }
        ReadingLevel::High => {
            "Write for a high-school reader: plain language, brief definitions for specialized \
             terms, no jargon without explanation."
        }
        ReadingLevel::College => {
            "Write for a college reader: precise terminology is fine, keep explanations tight."
        }
        ReadingLevel::Expert => {
            "Write for a domain expert: be terse and technical, skip basics, point out subtleties \
             and caveats."
        }
    }
}

/// Build the system/user messages for one explanation request.
pub fn build_prompt(
    mode: Mode,
    level: ReadingLevel,
    highlight: &str,
    window: &ContextWindow,
) -> ExplainPrompt {
    let system = format!(
        "You explain passages from documents the user is reading. Ground every statement in the \
         provided document context; if the context does not support an answer, say so instead \
         of guessing. Format the answer as Markdown.\n\n{}\n{}",
        mode_instruction(mode),
        level_instruction(level)
    );

    let context_note = if window.found {
        "The highlighted passage was located in the document; the context below surrounds it."
    } else {
        "The highlighted passage could not be located in the extracted text; the context below \
         is the opening of the document."
    };

    let user = format!(
        "{context_note}\n\n<document_context>\n{}\n</document_context>\n\n\
         <highlight>\n{}\n</highlight>",
        window.text,
        highlight.trim()
    );

    ExplainPrompt {
        system,
        user,
        mode,
        level,
    }
}
