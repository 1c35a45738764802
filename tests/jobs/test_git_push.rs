use async_trait::async_trait;
use homeflow::core::collab::{
    CommandOutput, CommandRequest, CommandRunner, LogSink, StaticSecrets,
};
use homeflow::core::config::HomeflowConfig;
use homeflow::core::error::TaskError;
use homeflow::core::flow::{FlowRunner, ParameterValues, TaskState};
use homeflow::jobs::{self, git_push, JobDeps};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Records every request; fails `git push` in directories containing `fail_in`.
#[derive(Default)]
struct FakeGit {
    calls: Mutex<Vec<CommandRequest>>,
    fail_in: Option<String>,
}

impl FakeGit {
    fn calls(&self) -> Vec<CommandRequest> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CommandRunner for FakeGit {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, TaskError> {
        self.calls.lock().expect("lock").push(request.clone());
        let failing = self
            .fail_in
            .as_deref()
            .is_some_and(|dir| request.cwd.to_string_lossy().contains(dir));
        if failing && request.args.first().map(String::as_str) == Some("push") {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: "rejected".to_string(),
                exit_code: 1,
            });
        }
        Ok(CommandOutput::default())
    }
}

fn config() -> HomeflowConfig {
    let mut config = HomeflowConfig::default();
    config.jobs.git_push.base_path = PathBuf::from("/srv/code");
    config.jobs.git_push.repos = vec!["blog-site".to_string(), "home-api".to_string()];
    config
}

fn deps(git: Arc<FakeGit>) -> JobDeps {
    JobDeps {
        secrets: Arc::new(StaticSecrets::new()),
        notifier: Arc::new(LogSink),
        commands: git,
        http: jobs::http_client().expect("http client"),
    }
}

#[tokio::test]
async fn every_repository_is_committed_and_pushed() {
    let git = Arc::new(FakeGit::default());
    let graph = git_push::build(&config(), &deps(git.clone())).expect("flow");

    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");

    assert!(result.is_success());
    assert_eq!(
        result.output("commit_and_push"),
        Some(&json!([
            { "path": "/srv/code/blog-site", "branch": "master" },
            { "path": "/srv/code/home-api", "branch": "develop" }
        ]))
    );

    let calls = git.calls();
    assert_eq!(calls.len(), 6);
    let blog: Vec<String> = calls
        .iter()
        .filter(|call| call.cwd == PathBuf::from("/srv/code/blog-site"))
        .map(CommandRequest::display)
        .collect();
    assert_eq!(
        blog,
        vec![
            "git add --all".to_string(),
            "git commit --allow-empty -m Automatic commit done by homeflow.".to_string(),
            "git push origin master".to_string(),
        ]
    );
}

#[tokio::test]
async fn one_rejected_push_fails_the_mapped_task() {
    let git = Arc::new(FakeGit {
        calls: Mutex::new(Vec::new()),
        fail_in: Some("home-api".to_string()),
    });
    let graph = git_push::build(&config(), &deps(git.clone())).expect("flow");

    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");

    assert_eq!(result.failed_tasks(), vec!["commit_and_push"]);
    let record = result.record("commit_and_push").expect("record");
    assert_eq!(record.children, vec![TaskState::Success, TaskState::Failed]);
    let error = record.error.as_ref().expect("error");
    assert_eq!(error.code, "CMD-001");
    assert_eq!(error.context.get("project"), Some(&"/srv/code/home-api".to_string()));
    assert_eq!(error.context.get("stderr"), Some(&"rejected".to_string()));
}

#[tokio::test]
async fn custom_branch_rules_apply() {
    let mut config = config();
    config.jobs.git_push.branch_rules = vec![];
    config.jobs.git_push.default_branch = "main".to_string();
    let git = Arc::new(FakeGit::default());
    let graph = git_push::build(&config, &deps(git.clone())).expect("flow");

    FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");

    let pushes: Vec<String> = git
        .calls()
        .iter()
        .filter(|call| call.args.first().map(String::as_str) == Some("push"))
        .map(CommandRequest::display)
        .collect();
    assert_eq!(pushes, vec!["git push origin main", "git push origin main"]);
}

#[tokio::test]
async fn no_repositories_is_a_successful_no_op() {
    let git = Arc::new(FakeGit::default());
    let graph = git_push::build(&HomeflowConfig::default(), &deps(git.clone())).expect("flow");
    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert!(result.is_success());
    assert_eq!(result.output("commit_and_push"), Some(&json!([])));
    assert!(git.calls().is_empty());
}
