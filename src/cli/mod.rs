// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All real work is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `prepare`   - corpus + word vectors → artifact dir
//   2. `train`     - artifact dir → runs/trainN
//   3. `translate` - read-eval loop over stdin
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};

use crate::domain::traits::Translator;
use commands::{Commands, PrepareArgs, TrainArgs, TranslateArgs};

#[derive(Parser, Debug)]
#[command(
    name = "seq2seq-zh-en",
    version = "0.1.0",
    about = "Train a GRU encoder-decoder on a Chinese-English corpus, then translate with it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case of the chosen subcommand.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Prepare(args)   => run_prepare(args),
            Commands::Train(args)     => run_train(args),
            Commands::Translate(args) => run_translate(args),
        }
    }
}

fn run_prepare(args: PrepareArgs) -> Result<()> {
    use crate::application::prepare_use_case::PrepareUseCase;

    tracing::info!("Preparing corpus '{}'", args.corpus);
    let summary = PrepareUseCase::new(args.into()).execute()?;

    println!(
        "Prepared {} sentence pairs (vocab zh={}, en={}).",
        summary.pairs, summary.source_vocab, summary.target_vocab
    );
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training on artifacts in '{}'", args.artifact_dir);
    let (run_dir, report) = TrainUseCase::new(args.into()).execute()?;

    match (report.best_epoch, report.best_loss) {
        (Some(epoch), Some(loss)) => println!(
            "Training complete. Best loss {:.4} at epoch {}, checkpoints in '{}'.",
            loss,
            epoch,
            run_dir.display()
        ),
        _ => println!("Training complete. Checkpoints in '{}'.", run_dir.display()),
    }
    Ok(())
}

fn run_translate(args: TranslateArgs) -> Result<()> {
    use crate::application::translate_use_case::TranslateUseCase;
    use crate::ml::InferBackend;

    let use_case = TranslateUseCase::<InferBackend>::open(
        &args.artifact_dir,
        &args.run_dir,
        args.checkpoint,
        Default::default(),
    )?;

    let meta = use_case.checkpoint();
    println!("Using the {} checkpoint (epoch {}, loss {:.4}).", meta.name, meta.epoch, meta.loss);

    let stdin = io::stdin();
    repl(&use_case, stdin.lock(), io::stdout())
}

/// Blocking read-eval loop: one translation per input line until `q`
/// (any case) or end of input.
pub fn repl<R: BufRead, W: Write>(translator: &dyn Translator, input: R, mut output: W) -> Result<()> {
    writeln!(output, "Type a Chinese sentence, or 'q' to quit.")?;

    for line in input.lines() {
        let line = line?;
        let text = line.trim_end_matches(&['\r', '\n'][..]);
        if text.eq_ignore_ascii_case("q") {
            break;
        }

        let translation = translator.translate(text)?;
        writeln!(output, "{}", translation)?;
        output.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Echo;

    impl Translator for Echo {
        fn translate(&self, text: &str) -> Result<String> {
            Ok(format!("<{text}>"))
        }
    }

    fn run_repl(input: &str) -> Vec<String> {
        let mut out = Vec::new();
        repl(&Echo, Cursor::new(input), &mut out).unwrap();
        String::from_utf8(out).unwrap().lines().skip(1).map(str::to_string).collect()
    }

    #[test]
    fn test_repl_translates_until_q() {
        assert_eq!(run_repl("你好\n 我 \nQ\n不会读到\n"), vec!["<你好>", "< 我 >"]);
    }

    #[test]
    fn test_repl_stops_at_end_of_input() {
        assert_eq!(run_repl("一\n二"), vec!["<一>", "<二>"]);
    }

    #[test]
    fn test_repl_passes_empty_lines_through() {
        assert_eq!(run_repl("\nq\n"), vec!["<>"]);
    }
}
