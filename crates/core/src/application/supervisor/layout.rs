// On-disk layout of supervised nodes (workdir, pidfiles, logfiles)

use std::path::{Path, PathBuf};

use crate::application::constants::NODE_NAME_PLACEHOLDER;
use crate::config::SupervisorConfig;
use crate::domain::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLayout {
    pub workdir: PathBuf,
    pub pidfile_template: String,
    pub logfile_template: String,
    pub loglevel: String,
}

impl NodeLayout {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            workdir: config.workdir.clone(),
            pidfile_template: config.pidfile_template.clone(),
            logfile_template: config.logfile_template.clone(),
            loglevel: config.loglevel.clone(),
        }
    }

    /// Pidfile path with `%n` left in place (the launcher expands it)
    pub fn pidfile_pattern(&self) -> PathBuf {
        self.workdir.join(&self.pidfile_template)
    }

    pub fn logfile_pattern(&self) -> PathBuf {
        self.workdir.join(&self.logfile_template)
    }

    /// Pidfile of `node_name`
    pub fn pidfile(&self, node_name: &str) -> PathBuf {
        expand(&self.pidfile_pattern(), node_name)
    }

    pub fn logfile(&self, node_name: &str) -> PathBuf {
        expand(&self.logfile_pattern(), node_name)
    }

    /// `--workdir/--pidfile/--logfile/--loglevel/--autoscale` launcher flags
    pub fn default_args(&self, node: &Node) -> Vec<String> {
        vec![
            format!("--workdir={}", self.workdir.display()),
            format!("--pidfile={}", self.pidfile_pattern().display()),
            format!("--logfile={}", self.logfile_pattern().display()),
            format!("--loglevel={}", self.loglevel),
            format!(
                "--autoscale={},{}",
                node.max_concurrency, node.min_concurrency
            ),
        ]
    }
}

impl Default for NodeLayout {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}

fn expand(pattern: &Path, node_name: &str) -> PathBuf {
    PathBuf::from(
        pattern
            .to_string_lossy()
            .replace(NODE_NAME_PLACEHOLDER, node_name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = NodeLayout::default();
        assert_eq!(
            layout.pidfile("worker1"),
            PathBuf::from("/var/run/scs/celeryd@worker1.pid")
        );
        assert_eq!(
            layout.logfile("worker1"),
            PathBuf::from("/var/run/scs/celeryd@worker1.log")
        );
        assert_eq!(
            layout.pidfile_pattern(),
            PathBuf::from("/var/run/scs/celeryd@%n.pid")
        );
    }

    #[test]
    fn test_default_args() {
        let mut node = Node::new("w", 0);
        node.set_autoscale(Some(8), Some(2));
        let args = NodeLayout::default().default_args(&node);
        assert_eq!(
            args,
            vec![
                "--workdir=/var/run/scs",
                "--pidfile=/var/run/scs/celeryd@%n.pid",
                "--logfile=/var/run/scs/celeryd@%n.log",
                "--loglevel=DEBUG",
                "--autoscale=8,2",
            ]
        );
    }
}
