use std::{env, process};

use triplestore::{
    Dataset, Pattern, TripleStoreError, TxnMode, check_integrity,
    client::{CommandLineConfig, TripleClient},
};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };

    let client = match TripleClient::open(&config.database, &config.dataset_config()) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    let result = run_command(&client, &config.command, &config.command_args);
    let closed = client.close();
    if let Err(err) = result.and(closed) {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn run_command(
    client: &TripleClient,
    command: &str,
    args: &[String],
) -> Result<(), TripleStoreError> {
    let dataset = client.dataset();
    match command {
        "status" => print_json(&dataset.stats()?),
        "graphs" => {
            for name in dataset.graph_names()? {
                println!("{name}");
            }
            Ok(())
        }
        "add" => {
            let [graph, s, p, o] = four_args(command, args)?;
            let added = client.add_statement(graph, s, p, o)?;
            println!("{}", if added { "added" } else { "unchanged" });
            Ok(())
        }
        "remove" => {
            let [graph, s, p, o] = four_args(command, args)?;
            let removed = client.remove_statement(graph, s, p, o)?;
            println!("{}", if removed { "removed" } else { "unchanged" });
            Ok(())
        }
        "query" => query(dataset, args),
        "check" => {
            let report = check_integrity(dataset)?;
            print_json(&report)?;
            if report.has_issues() {
                return Err(TripleStoreError::storage_io("integrity check found issues"));
            }
            Ok(())
        }
        other => Err(TripleStoreError::invalid_input(format!(
            "unknown command {other}"
        ))),
    }
}

fn query(dataset: &Dataset, args: &[String]) -> Result<(), TripleStoreError> {
    let Some((graph, positions)) = args.split_first() else {
        return Err(TripleStoreError::invalid_input("query requires a graph name"));
    };
    if positions.len() > 3 {
        return Err(TripleStoreError::invalid_input(
            "query takes at most subject, predicate and object",
        ));
    }
    let bound = |i: usize| {
        positions
            .get(i)
            .map(String::as_str)
            .filter(|value| *value != "*")
    };
    let pattern = Pattern::from_parts(bound(0), bound(1), bound(2));
    let txn = dataset.begin(TxnMode::Read)?;
    for triple in &txn.get_statements(graph, &pattern)? {
        print_json(&triple)?;
    }
    Ok(())
}

fn four_args<'a>(command: &str, args: &'a [String]) -> Result<[&'a str; 4], TripleStoreError> {
    match args {
        [g, s, p, o] => Ok([g.as_str(), s.as_str(), p.as_str(), o.as_str()]),
        _ => Err(TripleStoreError::invalid_input(format!(
            "{command} expects GRAPH SUBJECT PREDICATE OBJECT"
        ))),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), TripleStoreError> {
    let line = serde_json::to_string(value)
        .map_err(|e| TripleStoreError::invalid_input(e.to_string()))?;
    println!("{line}");
    Ok(())
}

