//! Template debugger CLI
//!
//! Drives the expansion-tree session engine against a live wiki API: parse
//! markup, list its parameters, expand it (client- or server-side), and an
//! interactive loop for stepping through evaluations and descents.
//!
//! # Usage
//!
//! ```bash
//! # Show the parameter table of a fragment
//! echo '{{Infobox|name={{{name|}}}}}' | tplscope_cli params
//!
//! # Expand everything, with an override applied
//! tplscope_cli expand --file draft.wiki --set name=Alice
//!
//! # Interactive session
//! tplscope_cli repl --title 'User:Me/Draft'
//! ```

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use tplscope::{ClientConfig, Session, WikiClient};

#[derive(Parser)]
#[command(name = "tplscope_cli")]
#[command(version = "0.1.0")]
#[command(about = "Interactive expansion-tree debugger for wikitext templates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Wiki api.php endpoint (falls back to WIKI_API_URL)
    #[arg(long, global = true)]
    api: Option<String>,

    /// Context title under which parsing and expansion run
    #[arg(long, short, global = true)]
    title: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the input and print its expansion tree
    Tree {
        /// Input file (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List the distinct placeholders of the input
    Params {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Expand the whole input to plain wikitext
    Expand {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Parameter overrides, name=value (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        /// Expand server-side inside a parameter frame instead of
        /// substituting overrides into the markup first
        #[arg(long)]
        frame: bool,
    },

    /// Interactive debugging loop
    Repl {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("cannot read stdin")?;
            Ok(buf)
        }
    }
}

fn build_session(cli: &Cli) -> Result<Session<WikiClient>> {
    let config = match &cli.api {
        Some(api) => ClientConfig::new(api.parse().context("invalid --api url")?),
        None => ClientConfig::from_env()?,
    };
    let client = WikiClient::new(config)?;
    Ok(Session::new(client))
}

fn apply_overrides(session: &mut Session<WikiClient>, overrides: &[String]) -> Result<()> {
    for pair in overrides {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("override '{pair}' is not NAME=VALUE");
        };
        let Some(row) = session.parameters().row_of_name(name) else {
            bail!("no parameter named '{name}'");
        };
        session.set_parameter_value(row, value)?;
        session.toggle_parameter_set(row, Some(true))?;
    }
    Ok(())
}

fn print_params(session: &Session<WikiClient>) {
    for (i, row) in session.parameters().rows().iter().enumerate() {
        let mark = if row.is_set {
            "✔".green()
        } else {
            "✘".red()
        };
        let name = if row.referenced {
            row.name.as_str().normal()
        } else {
            row.name.as_str().dimmed()
        };
        println!("{i:3} {mark} {name} = {}", row.value);
    }
}

fn print_crumbs(session: &Session<WikiClient>) {
    let labels: Vec<String> = session
        .breadcrumbs()
        .iter()
        .map(|c| {
            if c.is_history() {
                c.label.as_str().dimmed().to_string()
            } else {
                c.label.as_str().bold().to_string()
            }
        })
        .collect();
    println!("{}", labels.join(" ⟿ "));
}

fn print_notes(session: &mut Session<WikiClient>) {
    for note in session.notes() {
        eprintln!("{}", note.yellow());
    }
    session.clear_notes();
}

const REPL_HELP: &str = "\
commands:
  show                render the current document
  tree                print the expansion tree
  params              list parameters
  set <row> <text>    set a parameter override (and mark it set)
  toggle <row>        flip a parameter's set flag
  eval <visual>       evaluate one node (0 = whole document)
  evalrow <row>       evaluate all instances of a parameter
  descend <visual>    descend into a template invocation
  crumbs              show the breadcrumb trail
  back <crumb>        return to a breadcrumb
  undo                undo the last evaluation
  reset               undo everything
  input <text>        replace the input text
  quit";

async fn repl(mut session: Session<WikiClient>) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("{}", "tplscope repl - 'help' for commands".bold());
    loop {
        let line = match editor.readline("tpl> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let result = run_repl_command(&mut session, command, rest.trim()).await;
        match result {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => eprintln!("{}", e.to_string().red()),
        }
        print_notes(&mut session);
    }
    Ok(())
}

async fn run_repl_command(
    session: &mut Session<WikiClient>,
    command: &str,
    rest: &str,
) -> Result<bool> {
    match command {
        "quit" | "exit" => return Ok(true),
        "help" => println!("{REPL_HELP}"),
        "show" => println!("{}", session.rendered_output()),
        "tree" => match session.tree() {
            Some(tree) => print!("{}", format_tree(tree, session)),
            None => println!("(no tree)"),
        },
        "params" => print_params(session),
        "crumbs" => print_crumbs(session),
        "set" => {
            let (row, text) = rest
                .split_once(' ')
                .context("usage: set <row> <text>")?;
            let row: usize = row.parse().context("row must be a number")?;
            session.set_parameter_value(row, text)?;
            session.toggle_parameter_set(row, Some(true))?;
        }
        "toggle" => {
            let row: usize = rest.parse().context("usage: toggle <row>")?;
            session.toggle_parameter_set(row, None)?;
        }
        "eval" => {
            let visual: usize = rest.parse().context("usage: eval <visual>")?;
            session.evaluate_node(visual).await?;
            println!("{}", session.rendered_output());
        }
        "evalrow" => {
            let row: usize = rest.parse().context("usage: evalrow <row>")?;
            let n = session.evaluate_all_for_row(row).await?;
            println!("evaluated {n} instance(s)");
        }
        "descend" => {
            let visual: usize = rest.parse().context("usage: descend <visual>")?;
            match session.descend(visual).await? {
                tplscope::DescendOutcome::Descended => print_crumbs(session),
                tplscope::DescendOutcome::NotDescendable => {
                    println!("not a template invocation")
                }
            }
        }
        "back" => {
            let crumb: usize = rest.parse().context("usage: back <crumb>")?;
            session.return_to(crumb)?;
            print_crumbs(session);
        }
        "undo" => {
            if !session.undo()? {
                println!("nothing to undo");
            }
        }
        "reset" => session.undo_all()?,
        "input" => session.set_input(rest.to_string(), None).await?,
        other => println!("unknown command '{other}' - try 'help'"),
    }
    Ok(false)
}

fn format_tree(tree: &tplscope::tree::Tree, session: &Session<WikiClient>) -> String {
    let mut out = String::new();
    format_tree_node(tree, session, tree.root(), 0, &mut out);
    out
}

fn format_tree_node(
    tree: &tplscope::tree::Tree,
    session: &Session<WikiClient>,
    id: usize,
    depth: usize,
    out: &mut String,
) {
    use tplscope::tree::NodeKind;
    let Some(node) = tree.node(id) else {
        return;
    };
    let label = match &node.kind {
        NodeKind::Text(t) if t.trim().is_empty() => return,
        NodeKind::Text(t) => format!("text {:?}", t),
        NodeKind::Template => "template".to_string(),
        NodeKind::Placeholder { param_row } => match param_row {
            Some(row) => format!("placeholder (row {row})"),
            None => "placeholder".to_string(),
        },
        NodeKind::Ext { name, .. } => format!("ext <{name}>"),
        NodeKind::Other { tag } => format!("<{tag}>"),
        kind => format!("{kind:?}").to_lowercase(),
    };
    let visual = session
        .visuals()
        .visual_of(id)
        .map(|v| format!(" [{v}]"))
        .unwrap_or_default();
    out.push_str(&format!("{}{}{}\n", "  ".repeat(depth), label, visual));
    for child in &node.children {
        format_tree_node(tree, session, *child, depth + 1, out);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut session = build_session(&cli)?;
    if let Some(title) = cli.title.clone() {
        session.set_context_title(Some(title)).await?;
    }

    match &cli.command {
        Commands::Tree { file } => {
            let input = read_input(file.as_ref())?;
            session.set_input(input, None).await?;
            print_notes(&mut session);
            match session.tree() {
                Some(tree) => print!("{}", format_tree(tree, &session)),
                None => bail!("input did not parse to a tree"),
            }
        }
        Commands::Params { file } => {
            let input = read_input(file.as_ref())?;
            session.set_input(input, None).await?;
            print_notes(&mut session);
            print_params(&session);
        }
        Commands::Expand {
            file,
            overrides,
            frame,
        } => {
            let input = read_input(file.as_ref())?;
            session.set_input(input, None).await?;
            print_notes(&mut session);
            apply_overrides(&mut session, overrides)?;
            if *frame {
                println!("{}", session.preview_with_frame().await?);
            } else {
                session.evaluate_all().await?;
                println!("{}", session.rendered_output());
            }
        }
        Commands::Repl { file } => {
            if let Some(path) = file {
                let input = read_input(Some(path))?;
                session.set_input(input, None).await?;
                print_notes(&mut session);
            }
            repl(session).await?;
        }
    }
    Ok(())
}
