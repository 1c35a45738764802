//! Nightly commit-and-push of every configured repository.

use super::JobDeps;
use crate::core::collab::command::run_checked;
use crate::core::collab::CommandRequest;
use crate::core::config::{GitPushConfig, HomeflowConfig};
use crate::core::error::FlowError;
use crate::core::flow::{FlowBuilder, FlowGraph, TaskSpec};
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "git-push";

pub fn build(config: &HomeflowConfig, deps: &JobDeps) -> Result<FlowGraph, FlowError> {
    let settings = Arc::new(config.jobs.git_push.clone());
    let mut flow = FlowBuilder::new(NAME);

    let listing = settings.clone();
    let projects = flow.add_task(TaskSpec::from_fn("list_projects", move |_| {
        Ok(Value::from(project_paths(&listing)))
    }));

    let commands = deps.commands.clone();
    flow.add_task(
        TaskSpec::from_async("commit_and_push", move |inputs, _ctx| {
            let commands = commands.clone();
            let settings = settings.clone();
            async move {
                let path = inputs.arg_as::<String>(0)?;
                let branch = settings.branch_for(&path).to_string();

                let steps = [
                    vec!["add".to_string(), "--all".to_string()],
                    vec![
                        "commit".to_string(),
                        "--allow-empty".to_string(),
                        "-m".to_string(),
                        settings.commit_message.clone(),
                    ],
                    vec!["push".to_string(), settings.remote.clone(), branch.clone()],
                ];
                for args in steps {
                    let request = CommandRequest::new("git", args, path.as_str());
                    run_checked(commands.as_ref(), &request)
                        .await
                        .map_err(|err| err.with_context("project", path.clone()))?;
                }
                tracing::info!(project = %path, branch = %branch, "project pushed");
                Ok(json!({ "path": path, "branch": branch }))
            }
        })
        .map_arg(projects),
    );

    Ok(flow.build()?)
}

/// Absolute project directories, in configuration order.
pub fn project_paths(config: &GitPushConfig) -> Vec<String> {
    config
        .repos
        .iter()
        .map(|repo| config.base_path.join(repo).to_string_lossy().into_owned())
        .collect()
}
