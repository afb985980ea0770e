use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use strata::parser::tokenize;
use strata::{BuildError, Engine, EngineConfig, Record, Signal, Value};

#[derive(ClapParser)]
#[command(name = "strata")]
#[command(about = "Strata layout language CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Input value as `name=json`, emitted after the build
    #[arg(long = "input", value_name = "NAME=JSON", global = true)]
    inputs: Vec<String>,

    /// Keyed and pooled entries kept per list item cache
    #[arg(long, global = true)]
    cache_capacity: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tokens of a layout file
    Tokens {
        /// Path to the layout file
        file: PathBuf,
    },
    /// Check that a layout file builds
    Check {
        /// Path to the layout file
        file: PathBuf,
    },
    /// Build a layout file and print its view tree as JSON
    Tree {
        /// Path to the layout file
        file: PathBuf,
    },
    /// Link an inline expression and print its current value
    Eval {
        /// The expression to evaluate
        code: String,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env().init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = EngineConfig::default();
    if let Some(capacity) = cli.cache_capacity {
        config.list_cache_capacity = capacity;
    }
    let inputs = cli
        .inputs
        .iter()
        .map(|input| parse_input(input))
        .collect::<Result<Vec<_>>>()?;

    match cli.command {
        Commands::Tokens { file } => {
            let code = read(&file)?;
            let tokens = tokenize(&code).map_err(|error| report(&file, &code, BuildError::lex(error)))?;
            for token in tokens {
                println!("{}:{}\t{:?}\t{}", token.line, token.column, token.kind, token);
            }
        }
        Commands::Check { file } => {
            let code = read(&file)?;
            let (engine, _) = engine(config, &inputs)?;
            let layout = engine.build(&code).map_err(|error| report(&file, &code, error))?;
            let views: usize = layout.snapshot().iter().map(|view| view.count()).sum();
            eprintln!("Build OK: {} layers, {views} views", layout.layers.len());
        }
        Commands::Tree { file } => {
            let code = read(&file)?;
            let (engine, signals) = engine(config, &inputs)?;
            let layout = engine.build(&code).map_err(|error| report(&file, &code, error))?;
            emit(&signals);
            println!("{}", serde_json::to_string_pretty(&layout.snapshot())?);
        }
        Commands::Eval { code } => {
            let (engine, signals) = engine(config, &inputs)?;
            let linked = engine
                .link_expression(&code)
                .map_err(|error| report(Path::new("<eval>"), &code, error))?;
            emit(&signals);
            match linked.latest() {
                Some(value) => println!("{}: {}", linked.ty, serde_json::to_string(&value)?),
                None => println!("{}: <pending>", linked.ty),
            }
        }
    }
    Ok(())
}

fn read(file: &Path) -> Result<String> {
    log::info!("reading {}", file.display());
    fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))
}

fn report(file: &Path, code: &str, error: BuildError) -> anyhow::Error {
    eprint!("{}", error.report(&file.display().to_string(), code));
    anyhow::anyhow!(error)
}

/// Registers the command line inputs. Primitive values get a type from
/// their JSON shape; lists and records stay untyped and need an `inputs`
/// declaration in the layout.
fn engine(config: EngineConfig, inputs: &[(String, Value)]) -> Result<(Engine, Vec<(Signal, Value)>)> {
    let mut engine = Engine::with_config(config);
    let mut signals = Vec::with_capacity(inputs.len());
    for (name, value) in inputs {
        let signal = match value {
            Value::Number(_) => engine.register_typed_input(name.as_str(), "Number"),
            Value::String(_) => engine.register_typed_input(name.as_str(), "String"),
            Value::Bool(_) => engine.register_typed_input(name.as_str(), "Bool"),
            _ => engine.register_input(name.as_str()),
        }?;
        signals.push((signal, value.clone()));
    }
    Ok((engine, signals))
}

fn emit(signals: &[(Signal, Value)]) {
    for (signal, value) in signals {
        signal.emit(value.clone());
    }
}

fn parse_input(input: &str) -> Result<(String, Value)> {
    let Some((name, json)) = input.split_once('=') else {
        bail!("input '{input}' must have the form name=json");
    };
    let value = match serde_json::from_str::<serde_json::Value>(json) {
        Ok(json) => to_value(json).with_context(|| format!("input '{name}'"))?,
        Err(_) => Value::string(json),
    };
    Ok((name.trim().to_string(), value))
}

fn to_value(json: serde_json::Value) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(flag) => Value::Bool(flag),
        serde_json::Value::Number(number) => Value::Number(number.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(text) => Value::string(text),
        serde_json::Value::Array(items) => {
            let records = items.into_iter().map(to_record).collect::<Result<Vec<_>>>()?;
            Value::List(records.into())
        }
        object @ serde_json::Value::Object(_) => Value::Record(to_record(object)?),
    })
}

fn to_record(json: serde_json::Value) -> Result<Record> {
    let mut fields = match json {
        serde_json::Value::Object(fields) => fields,
        other => bail!("list items must be objects, found {other}"),
    };
    let Some(serde_json::Value::String(tag)) = fields.remove("tag") else {
        bail!("list items need a string 'tag' field");
    };
    fields
        .into_iter()
        .try_fold(Record::new(tag), |record, (name, value)| Ok(record.with(name, to_value(value)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_parse_as_json_or_text() {
        assert_eq!(parse_input("gap=8").unwrap(), ("gap".into(), Value::Number(8.0)));
        assert_eq!(parse_input("title=Hello").unwrap(), ("title".into(), Value::string("Hello")));
        assert!(parse_input("broken").is_err());

        let (_, users) = parse_input(r#"users=[{"tag":"user","id":1,"name":"Ada"}]"#).unwrap();
        let expected = Record::new("user")
            .with("id", Value::Number(1.0))
            .with("name", Value::string("Ada"));
        assert_eq!(users, Value::List(vec![expected].into()));
        assert!(parse_input(r#"users=[{"id":1}]"#).is_err());
    }

    #[test]
    fn primitive_inputs_are_typed() {
        let inputs = vec![("score".to_string(), Value::Number(3.0))];
        let (engine, signals) = engine(EngineConfig::default(), &inputs).unwrap();
        let linked = engine.link_expression("score * 2").unwrap();
        emit(&signals);
        assert_eq!(linked.latest(), Some(Value::Number(6.0)));
    }
}
