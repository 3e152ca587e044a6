//! Bundled agents
//!
//! | agent     | priority | claims                     | owns                                    |
//! |-----------|----------|----------------------------|-----------------------------------------|
//! | `general` | 0        | everything (default)       | -                                       |
//! | `files`   | 20       | file vocabulary            | `read_file`, `list_directory`, `write_file` |
//! | `shell`   | 10       | command vocabulary         | `run_command`                           |
//!
//! `current_time` is registered globally, owned by nobody.

use std::sync::Arc;

use switchboard_core::{
    AgentRegistry, DispatchConfig, LlmAgent, LlmProvider, Result, ToolRegistry,
};
use tracing::info;

use crate::prompts;
use crate::svckit::{
    CurrentTimeTool, ListDirectoryTool, ReadFileTool, RunCommandTool, ShellConfig, WriteFileTool,
};
use crate::workspace::Workspace;

pub const GENERAL: &str = "general";
pub const FILES: &str = "files";
pub const SHELL: &str = "shell";

const FILE_WORDS: &[&str] = &[
    "file", "files", "folder", "folders", "directory", "directories", "read", "write", "save",
    "contents", "path",
];

const COMMAND_WORDS: &[&str] = &[
    "run", "execute", "command", "commands", "shell", "terminal", "program", "script",
];

/// Shared settings for the bundled agents
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub model: String,
    pub workspace: Arc<Workspace>,
    pub shell: ShellConfig,
}

pub fn general_agent(provider: Arc<dyn LlmProvider>, settings: &AgentSettings) -> Result<LlmAgent> {
    LlmAgent::builder(GENERAL, "General conversation and questions")
        .provider(provider)
        .capabilities(["chat"])
        .priority(0)
        .system_prompt(prompts::general())
        .model(&settings.model)
        .peers([FILES, SHELL])
        .build()
}

pub fn files_agent(provider: Arc<dyn LlmProvider>, settings: &AgentSettings) -> Result<LlmAgent> {
    let ws = &settings.workspace;
    LlmAgent::builder(FILES, "Reads, lists and writes files in the workspace")
        .provider(provider)
        .capabilities(["files"])
        .priority(20)
        .keywords(FILE_WORDS.iter().copied())
        .tool(ReadFileTool::new(Arc::clone(ws)))
        .tool(ListDirectoryTool::new(Arc::clone(ws)))
        .tool(WriteFileTool::new(Arc::clone(ws)))
        .alias("cat", "read_file")
        .alias("open_file", "read_file")
        .alias("ls", "list_directory")
        .alias("list_files", "list_directory")
        .alias("save_file", "write_file")
        .system_prompt(prompts::files())
        .model(&settings.model)
        .temperature(0.2)
        .peers([SHELL, GENERAL])
        .build()
}

pub fn shell_agent(provider: Arc<dyn LlmProvider>, settings: &AgentSettings) -> Result<LlmAgent> {
    LlmAgent::builder(SHELL, "Runs programs in the workspace")
        .provider(provider)
        .capabilities(["shell"])
        .priority(10)
        .keywords(COMMAND_WORDS.iter().copied())
        .tool(RunCommandTool::new(
            Arc::clone(&settings.workspace),
            settings.shell.clone(),
        ))
        .alias("shell", "run_command")
        .alias("exec", "run_command")
        .alias("bash", "run_command")
        .system_prompt(prompts::shell())
        .model(&settings.model)
        .temperature(0.2)
        .peers([FILES, GENERAL])
        .build()
}

/// Registries holding the bundled agents and every tool they can reach
pub struct Bundle {
    pub agents: AgentRegistry,
    pub tools: ToolRegistry,
}

/// Register the bundled agents into `agents`, import their tools, and add
/// the global ones. `general` becomes the default unless `config` names
/// another agent.
pub fn install(
    mut agents: AgentRegistry,
    provider: &Arc<dyn LlmProvider>,
    settings: &AgentSettings,
    config: &DispatchConfig,
) -> Result<Bundle> {
    agents.register(Arc::new(general_agent(Arc::clone(provider), settings)?));
    agents.register(Arc::new(files_agent(Arc::clone(provider), settings)?));
    agents.register(Arc::new(shell_agent(Arc::clone(provider), settings)?));

    agents.set_default_agent(GENERAL)?;
    agents.apply_default(config)?;

    let mut tools = ToolRegistry::new();
    let imported = agents.register_agent_tools(&mut tools);
    tools.register_tool(CurrentTimeTool);

    info!(
        agents = agents.len(),
        tools = tools.len(),
        imported,
        default = agents.default_agent().unwrap_or("-"),
        "Installed bundled agents"
    );

    Ok(Bundle { agents, tools })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use switchboard_core::{
        Agent, Completion, GenerationOptions, Message, RequestContext, TurnConfig, TurnRunner,
    };

    /// Pops canned replies in order
    struct Replay(Mutex<Vec<&'static str>>);

    #[async_trait]
    impl LlmProvider for Replay {
        fn name(&self) -> &str {
            "replay"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn complete(&self, _messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
            let mut replies = self.0.lock().unwrap();
            let reply = if replies.is_empty() { "" } else { replies.remove(0) };
            Ok(Completion::text(reply, &options.model))
        }
    }

    fn bundle(replies: Vec<&'static str>) -> (tempfile::TempDir, Bundle) {
        let dir = tempfile::tempdir().unwrap();
        let settings = AgentSettings {
            model: "test-model".into(),
            workspace: Arc::new(Workspace::open(dir.path()).unwrap()),
            shell: ShellConfig::default(),
        };
        let provider: Arc<dyn LlmProvider> = Arc::new(Replay(Mutex::new(replies)));
        let bundle = install(AgentRegistry::new(), &provider, &settings, &DispatchConfig::default()).unwrap();
        (dir, bundle)
    }

    #[test]
    fn test_install_registers_everything() {
        let (_dir, bundle) = bundle(vec![]);

        assert_eq!(bundle.agents.names(), [GENERAL, FILES, SHELL]);
        assert_eq!(bundle.agents.default_agent(), Some(GENERAL));
        assert_eq!(
            bundle.tools.names(),
            ["current_time", "list_directory", "read_file", "run_command", "write_file"]
        );
        assert_eq!(bundle.tools.provider_tools(FILES).map(<[String]>::len), Some(3));
        assert_eq!(bundle.tools.provider_tools(SHELL), Some(&["run_command".to_string()][..]));
    }

    #[tokio::test]
    async fn test_routing_by_vocabulary() {
        let (_dir, bundle) = bundle(vec![]);

        let pick = |input: &'static str| {
            let agents = &bundle.agents;
            async move {
                agents
                    .find_best_agent(&RequestContext::new(input))
                    .await
                    .unwrap()
                    .map(|a| a.name().to_string())
            }
        };

        assert_eq!(pick("Please read the README file").await.as_deref(), Some(FILES));
        assert_eq!(pick("run the test suite").await.as_deref(), Some(SHELL));
        // Both vocabularies: files has the higher priority
        assert_eq!(pick("run a command to write a file").await.as_deref(), Some(FILES));
        assert_eq!(pick("what is the capital of France?").await.as_deref(), Some(GENERAL));
    }

    #[tokio::test]
    async fn test_files_turn_end_to_end() {
        let (dir, bundle) = bundle(vec![
            "THOUGHT: look first\nTOOL: {\"name\": \"ls\", \"parameters\": {}}",
            "FINAL ANSWER: The workspace holds notes.md.",
        ]);
        std::fs::write(dir.path().join("notes.md"), "# hi").unwrap();

        let runner = TurnRunner::new(
            Arc::new(bundle.agents),
            Arc::new(bundle.tools),
            TurnConfig::default(),
        );
        let outcome = runner
            .run(RequestContext::new("which files are in the folder?"))
            .await
            .unwrap();

        assert_eq!(outcome.rounds, 2);
        let result = &outcome.tool_results[0];
        assert_eq!(result.tool, "list_directory");
        assert!(result.success);
        assert_eq!(
            result.output.as_ref().unwrap()["entries"][0]["name"],
            "notes.md"
        );
        assert_eq!(
            outcome.response.message.as_deref(),
            Some("The workspace holds notes.md.")
        );
        // The follow-up round stays with the agent that asked for the tool
        assert_eq!(outcome.response.metadata.unwrap()["agent"], FILES);
    }
}
