use anyhow::Result;
use async_trait::async_trait;
use rand::prelude::IndexedRandom;
use rand::rng;
use std::sync::Arc;

use crate::commands::{CommandDescriptor, DescriptorError, TextCommand, TextContext};

const AFFIRMATIVE: &[&str] = &[
    "It is certain.",
    "Without a doubt.",
    "You may rely on it.",
    "Most likely.",
    "Signs point to yes.",
];

const NEGATIVE: &[&str] = &[
    "Don't count on it.",
    "My reply is no.",
    "Outlook not so good.",
    "Very doubtful.",
];

const NEUTRAL: &[&str] = &["Reply hazy, try again.", "Ask again later.", "Cannot predict now."];

/// A text-only command that simulates a Magic 8-Ball
pub struct EightBallCommand {
    /// Answers grouped by tone. A tone is picked first, then an answer.
    tones: [&'static [&'static str]; 3],
}

impl Default for EightBallCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl EightBallCommand {
    pub fn new() -> Self {
        EightBallCommand {
            tones: [AFFIRMATIVE, NEGATIVE, NEUTRAL],
        }
    }

    pub fn descriptor() -> Result<CommandDescriptor, DescriptorError> {
        CommandDescriptor::builder("8ball", "Ask the Magic 8-Ball a yes/no question")
            .usage("<question>")
            .text(Arc::new(EightBallCommand::new()))
            .build()
    }

    fn answer(&self) -> &'static str {
        let mut rng = rng();

        self.tones
            .choose(&mut rng)
            .and_then(|answers| answers.choose(&mut rng))
            .copied()
            .unwrap_or("The magic 8-ball is cloudy right now.")
    }

    #[cfg(test)]
    fn all_answers(&self) -> Vec<&'static str> {
        self.tones
            .iter()
            .flat_map(|answers| answers.iter().copied())
            .collect()
    }
}

#[async_trait]
impl TextCommand for EightBallCommand {
    async fn execute(&self, ctx: &TextContext<'_>, args: &[String]) -> Result<()> {
        if args.is_empty() {
            ctx.reply("Ask me a question and I shall reveal your fate!").await?;
            return Ok(());
        }

        let question = args.join(" ");
        let answer = self.answer();
        ctx.reply(format!(
            "{} asked: {} 🎱 {}",
            ctx.message.author.mention(),
            question,
            answer
        ))
        .await?;
        Ok(())
    }
}
