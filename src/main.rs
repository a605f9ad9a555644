//! Command line front end for the engine. The library is the product; this
//! binary covers the everyday chores: inspecting a net file, running a
//! forward pass, training against a lesson, and converting lessons to and
//! from delimited text.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use axon_nn::lesson::csv::{self, CsvSection, CsvSeparators};
use axon_nn::{EngineError, Lesson, Network, Session, TeachResult, Teacher};

#[derive(Parser)]
#[command(name = "axon-nn", about = "Feed-forward neural net engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a summary of a saved net file.
    Info {
        /// Net file (JSON).
        net: String,
    },
    /// Run one forward pass and print the outputs.
    Think {
        /// Net file (JSON).
        net: String,
        /// Input activations, one per input neuron.
        #[arg(long, value_delimiter = ',', required = true)]
        inputs: Vec<f64>,
        /// Number of think steps to run (recurrent nets need several).
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// Train a net against a lesson and save the result.
    Train {
        /// Net file (JSON).
        net: String,
        /// Lesson file (JSON).
        #[arg(long)]
        lesson: String,
        /// Learning rate.
        #[arg(long, default_value_t = 0.5)]
        rate: f64,
        /// Stop once the net error falls to this value.
        #[arg(long, default_value_t = 1e-3)]
        target: f64,
        /// Give up after this many teach steps.
        #[arg(long, default_value_t = 100_000)]
        max_steps: usize,
        /// Seed for weight randomization; omit to keep the saved weights.
        #[arg(long)]
        seed: Option<u64>,
        /// Where to write the trained net; defaults to overwriting the input.
        #[arg(long)]
        out: Option<String>,
    },
    /// Write a lesson file as delimited text.
    ExportLesson {
        /// Lesson file (JSON).
        lesson: String,
        /// Output text file.
        out: String,
        /// Skip the header row.
        #[arg(long)]
        no_header: bool,
    },
    /// Read delimited text into a lesson file.
    ImportLesson {
        /// Input text file.
        input: String,
        /// Lesson file to write (JSON).
        out: String,
        /// Number of input columns; the rest are outputs.
        #[arg(long)]
        inputs: usize,
        /// The text has no header row.
        #[arg(long)]
        no_header: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            match e {
                EngineError::Validation(_) => ExitCode::from(2),
                EngineError::State(_) => ExitCode::from(3),
                EngineError::NotFound(_) => ExitCode::from(4),
                EngineError::Io(_) => ExitCode::from(5),
            }
        }
    }
}

fn run(command: Command) -> axon_nn::Result<ExitCode> {
    match command {
        Command::Info { net } => {
            let net = Network::load_json(&net)?;
            println!("inputs:        {}", net.input_count());
            println!("outputs:       {}", net.output_count());
            println!("hidden:        {} in {} layer(s)", net.hidden_count_all(), net.hidden_layer_count());
            println!("context:       {}", net.context_count());
            println!("unresolved:    {}", net.unresolved_count());
            println!("links:         {}", net.links().len());
            println!("resolved:      {}", net.is_fully_resolved());
            Ok(ExitCode::SUCCESS)
        }
        Command::Think { net, inputs, steps } => {
            let mut net = Network::load_json(&net)?;
            if inputs.len() != net.input_count() {
                return Err(EngineError::Validation(format!(
                    "{} input values given, net has {} inputs",
                    inputs.len(),
                    net.input_count()
                )));
            }
            for (i, &value) in inputs.iter().enumerate() {
                net.apply_input_act(i, value)?;
            }
            for _ in 0..steps.max(1) {
                net.think_step();
            }
            for k in 0..net.output_count() {
                println!("{} = {}", net.output_name(k)?, net.output_out(k)?);
            }
            if let Some(winner) = net.output_winner() {
                println!("winner: {}", net.output_name(winner)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Train { net, lesson, rate, target, max_steps, seed, out } => {
            let out_path = out.unwrap_or_else(|| net.clone());
            let mut session = match seed {
                Some(s) => Session::with_seed(s),
                None => Session::new(),
            };
            session.open_net(&net)?;
            session.load_lesson(&lesson)?;
            let mut teacher = Teacher::new("cli", rate, target);
            teacher.max_teach_steps = max_steps;
            session.add_teacher(teacher)?;
            session.select_teacher("cli")?;
            if seed.is_some() {
                session.randomize_net()?;
            }

            let mut result = session.teach_step()?;
            while result.can_continue() {
                result = session.teach_step()?;
            }
            println!(
                "{:?} after {} step(s), net error {}",
                result,
                session.teach_steps_done(),
                session.last_net_error()
            );
            session.stop_teaching();
            session.save_net(&out_path)?;
            match result {
                TeachResult::TargetNetErrorReached => Ok(ExitCode::SUCCESS),
                _ => Ok(ExitCode::from(6)),
            }
        }
        Command::ExportLesson { lesson, out, no_header } => {
            let lesson = Lesson::load_json(&lesson)?;
            csv::export_lesson(
                &lesson,
                &out,
                0,
                !no_header,
                CsvSection::Full,
                Default::default(),
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Command::ImportLesson { input, out, inputs, no_header } => {
            let mut lesson = Lesson::new();
            lesson.set_input_count(inputs)?;
            // Output width is discovered from the first row on import when a
            // header is present; without one the caller's split stands.
            let text_cols = first_row_width(&input)?;
            if text_cols < inputs {
                return Err(EngineError::Validation(format!(
                    "text has {text_cols} column(s), fewer than the {inputs} declared inputs"
                )));
            }
            lesson.set_output_count(text_cols - inputs)?;
            csv::import_lesson(
                &mut lesson,
                &input,
                !no_header,
                CsvSection::Full,
                Default::default(),
            )?;
            lesson.save_json(&out)?;
            println!("{} pattern(s) imported", lesson.pattern_count());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn first_row_width(path: &str) -> axon_nn::Result<usize> {
    let text = std::fs::read_to_string(path)?;
    let first = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| EngineError::Validation("text file is empty".into()))?;
    // Quoted column names may embed the separator; count like the importer.
    Ok(csv::split_row(first, CsvSeparators::default().list_separator).len())
}
