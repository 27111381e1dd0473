use std::path::Path;

use crate::{
    TripleStoreError,
    config::{DatasetConfig, WriterPolicy, open_dataset},
    dataset::Dataset,
    triple::{Pattern, Triple},
    txn::TxnMode,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub database: String,
    pub policy: WriterPolicy,
    pub command: String,
    pub command_args: Vec<String>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut database = String::from("memory");
        let mut policy = WriterPolicy::default();
        let mut command = None;
        let mut command_args = Vec::new();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match *arg {
                "--db" | "--database" if command.is_none() => {
                    database = iter
                        .next()
                        .ok_or_else(|| "--db requires a value".to_string())?
                        .to_string();
                }
                "--policy" if command.is_none() => {
                    let value = iter
                        .next()
                        .ok_or_else(|| "--policy requires a value".to_string())?;
                    policy = WriterPolicy::parse(value).map_err(|e| e.to_string())?;
                }
                other if other.starts_with("--") && command.is_none() => {
                    return Err(format!("unknown flag {other}"));
                }
                other if command.is_none() => command = Some(other.to_string()),
                other => command_args.push(other.to_string()),
            }
        }
        Ok(Self {
            database,
            policy,
            command: command.unwrap_or_else(|| "status".to_string()),
            command_args,
        })
    }

    pub fn dataset_config(&self) -> DatasetConfig {
        let config = if self.database == "memory" {
            DatasetConfig::memory()
        } else {
            DatasetConfig::sqlite()
        };
        config.with_writer_policy(self.policy)
    }

    pub fn help() -> &'static str {
        "Usage: triplestore [--db memory|PATH] [--policy fail-fast|queue] <command> [args]\n\
         Commands:\n  \
         status              dataset statistics as JSON\n  \
         graphs              list graph names\n  \
         add G S P O         add a triple to graph G\n  \
         remove G S P O      remove a triple from graph G\n  \
         query G [S] [P] [O] print matching triples as JSON lines (* = any)\n  \
         check               integrity report as JSON\n"
    }
}

/// Per-call access to a dataset: every method runs in its own transaction.
#[derive(Clone, Debug)]
pub struct TripleClient {
    dataset: Dataset,
}

impl TripleClient {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub fn open<P: AsRef<Path>>(path: P, config: &DatasetConfig) -> Result<Self, TripleStoreError> {
        Ok(Self::new(open_dataset(path, config)?))
    }

    pub fn in_memory() -> Result<Self, TripleStoreError> {
        Ok(Self::new(Dataset::open_in_memory()?))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn load_graph<I>(&self, graph: &str, triples: I) -> Result<usize, TripleStoreError>
    where
        I: IntoIterator<Item = Triple>,
    {
        self.dataset.load_statements(graph, triples)
    }

    /// `None` in any position matches every value.
    pub fn get_statements(
        &self,
        graph: &str,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Result<Vec<Triple>, TripleStoreError> {
        let pattern = Pattern::from_parts(subject, predicate, object);
        let mut txn = self.dataset.begin(TxnMode::Read)?;
        let statements = txn.get_statements(graph, &pattern)?;
        txn.commit()?;
        Ok(statements.to_vec())
    }

    pub fn add_statement(
        &self,
        graph: &str,
        subject: &str,
        predicate: &str,
        object: &str,
    ) -> Result<bool, TripleStoreError> {
        let triple = Triple::new(subject, predicate, object);
        self.dataset.write(|txn| txn.add_statement(graph, &triple))
    }

    pub fn remove_statement(
        &self,
        graph: &str,
        subject: &str,
        predicate: &str,
        object: &str,
    ) -> Result<bool, TripleStoreError> {
        let triple = Triple::new(subject, predicate, object);
        self.dataset.write(|txn| txn.remove_statement(graph, &triple))
    }

    pub fn close(self) -> Result<(), TripleStoreError> {
        self.dataset.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args_defaults() {
        let cfg = CommandLineConfig::from_args(&["triplestore"]).unwrap();
        assert_eq!(cfg.database, "memory");
        assert_eq!(cfg.policy, WriterPolicy::FailFast);
        assert_eq!(cfg.command, "status");
        assert!(cfg.command_args.is_empty());
    }

    #[test]
    fn test_from_args_command_and_arguments() {
        let cfg = CommandLineConfig::from_args(&[
            "triplestore",
            "--db",
            "data.db",
            "--policy",
            "queue",
            "query",
            "g",
            "*",
            "p",
        ])
        .unwrap();
        assert_eq!(cfg.database, "data.db");
        assert_eq!(cfg.policy, WriterPolicy::Queue);
        assert_eq!(cfg.command, "query");
        assert_eq!(cfg.command_args, vec!["g", "*", "p"]);
        assert_eq!(cfg.dataset_config().backend, crate::BackendKind::SQLite);
    }

    #[test]
    fn test_from_args_rejects_bad_input() {
        assert!(CommandLineConfig::from_args(&["triplestore", "--db"]).is_err());
        assert!(CommandLineConfig::from_args(&["triplestore", "--verbose"]).is_err());
        assert!(CommandLineConfig::from_args(&["triplestore", "--policy", "block"]).is_err());
    }

    #[test]
    fn test_client_round_trip() {
        let client = TripleClient::in_memory().unwrap();
        assert!(client.add_statement("g", "a", "knows", "b").unwrap());
        assert!(!client.add_statement("g", "a", "knows", "b").unwrap());
        assert_eq!(
            client.get_statements("g", None, Some("knows"), None).unwrap(),
            vec![Triple::new("a", "knows", "b")]
        );
        assert!(client.remove_statement("g", "a", "knows", "b").unwrap());
        assert!(client.get_statements("g", None, None, None).unwrap().is_empty());
    }
}
