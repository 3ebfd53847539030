//! Submit command construction
//!
//! A [`SubmitCommand`] is kept structured so it can be executed directly
//! (argv plus environment) or printed as one shell line for dry runs and
//! interactive use.

use serde::Serialize;
use std::borrow::Cow;

use slurmer_sweep::{render, Binding, TemplateError};

use crate::config::{JobGroupSpec, Settings};

/// How the command runs the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMode {
    /// Submitted through the batch submission executable
    Batch,
    /// Run directly in a login shell
    Interactive,
}

/// One fully rendered submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitCommand {
    pub mode: CommandMode,

    /// Shell prefix that must run first (conda activation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prelude: Option<String>,

    /// Environment assignments from plain parameters
    pub env: Vec<(String, String)>,

    /// Executable: the sbatch command or the shell
    pub program: String,

    /// Rendered scheduler options
    pub options: Vec<String>,

    /// `--dependency=...` flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,

    pub job_name: String,

    /// Global options from the command line, placed after `-J`
    pub overrides: Vec<String>,

    /// Script and arguments, or `--wrap=<command>`
    pub target: Vec<String>,
}

impl SubmitCommand {
    /// Arguments following the program.
    pub fn argv(&self) -> Vec<String> {
        match self.mode {
            CommandMode::Interactive => self.target.clone(),
            CommandMode::Batch => {
                let mut argv = self.options.clone();
                argv.extend(self.dependency.iter().cloned());
                argv.push("-J".to_string());
                argv.push(self.job_name.clone());
                argv.extend(self.overrides.iter().cloned());
                argv.extend(self.target.iter().cloned());
                argv
            }
        }
    }

    /// Copy with a dependency on the given job IDs.
    pub fn with_dependency(&self, kind: &str, ids: &[String]) -> Self {
        let mut cmd = self.clone();
        cmd.dependency = if ids.is_empty() {
            None
        } else {
            Some(format!("--dependency={}:{}", kind, ids.join(":")))
        };
        cmd
    }

    /// Single shell line equivalent to running this command.
    pub fn to_shell(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(prelude) = &self.prelude {
            parts.push(format!("{} &&", prelude));
        }
        for (key, value) in &self.env {
            parts.push(format!("{}={}", key, quote(value)));
        }
        parts.push(quote(&self.program).into_owned());
        parts.extend(self.argv().iter().map(|a| quote(a).into_owned()));
        parts.join(" ")
    }
}

fn quote(word: &str) -> Cow<'_, str> {
    // Only NUL bytes are unquotable; leave such words untouched
    shlex::try_quote(word).unwrap_or(Cow::Borrowed(word))
}

/// Inputs shared by every command of a run.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub sbatch_command: String,
    pub shell: String,
    pub interactive: bool,
    pub overrides: Vec<String>,
}

impl CommandContext {
    pub fn new(settings: &Settings, interactive: bool, overrides: Vec<String>) -> Self {
        Self {
            sbatch_command: settings.sbatch_command.clone(),
            shell: settings.shell.clone(),
            interactive,
            overrides,
        }
    }
}

/// Render the command for one binding of `group`.
///
/// Arguments are the script (or inline command), the `args` templates,
/// positional `$` parameters sorted by name, then flag `-` parameters sorted
/// by name. Plain parameters become environment assignments.
pub fn build_command(
    group: &JobGroupSpec,
    binding: &Binding,
    job_name: &str,
    ctx: &CommandContext,
) -> Result<SubmitCommand, TemplateError> {
    let mut env = Vec::new();
    let mut positional: Vec<(&str, String)> = Vec::new();
    let mut flags: Vec<(&str, Option<String>)> = Vec::new();
    for (key, value) in binding.iter() {
        if key.starts_with('$') {
            positional.push((key, value.render()));
        } else if key.starts_with('-') {
            flags.push((key, (!value.is_null()).then(|| value.render())));
        } else {
            env.push((key.to_string(), value.render()));
        }
    }
    positional.sort_by(|a, b| a.0.cmp(b.0));
    flags.sort_by(|a, b| a.0.cmp(b.0));

    let mut arguments = Vec::new();
    for template in &group.args {
        arguments.push(render(template, binding)?);
    }
    arguments.extend(positional.into_iter().map(|(_, v)| v));
    for (flag, value) in flags {
        arguments.push(flag.to_string());
        arguments.extend(value);
    }

    let prelude = group
        .env
        .as_ref()
        .map(|name| format!("source ~/.bashrc && conda activate {}", name));

    let (mode, program, target) = match (&group.script, &group.command) {
        (Some(script), _) => {
            let mut words = vec![render(script, binding)?];
            words.extend(arguments);
            if ctx.interactive {
                words.insert(0, "-l".to_string());
                (CommandMode::Interactive, ctx.shell.clone(), words)
            } else {
                (CommandMode::Batch, ctx.sbatch_command.clone(), words)
            }
        }
        (None, Some(command)) => {
            let mut line = render(command, binding)?;
            for arg in &arguments {
                line.push(' ');
                line.push_str(&quote(arg));
            }
            if ctx.interactive {
                (CommandMode::Interactive, ctx.shell.clone(), vec!["-lc".to_string(), line])
            } else {
                (CommandMode::Batch, ctx.sbatch_command.clone(), vec![format!("--wrap={}", line)])
            }
        }
        // Rejected when the group is loaded
        (None, None) => (CommandMode::Batch, ctx.sbatch_command.clone(), Vec::new()),
    };

    Ok(SubmitCommand {
        mode,
        prelude,
        env,
        program,
        options: group.slurm.render(binding)?,
        dependency: None,
        job_name: job_name.to_string(),
        overrides: ctx.overrides.clone(),
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JobsFile, ConfigFormat};
    use slurmer_sweep::ParamValue;

    fn group(yaml: &str) -> JobGroupSpec {
        let file = JobsFile::parse(yaml, ConfigFormat::Yaml).unwrap();
        file.groups()[0].spec.as_ref().unwrap().clone()
    }

    fn ctx(interactive: bool) -> CommandContext {
        CommandContext::new(&Settings::default(), interactive, vec!["--qos=high".to_string()])
    }

    #[test]
    fn test_batch_argv_order() {
        let spec = group(
            r#"
train:
  script: train.sh
  args: ["--data", "{dataset}"]
  slurm: { --time: "1:00:00" }
"#,
        );
        let binding = Binding::from_pairs([
            ("dataset", ParamValue::from("mnist")),
            ("--lr", ParamValue::Float(0.1)),
            ("$seed", ParamValue::Int(3)),
            ("--verbose", ParamValue::Null),
        ]);
        let cmd = build_command(&spec, &binding, "train-mnist", &ctx(false)).unwrap();
        assert_eq!(cmd.program, "sbatch");
        assert_eq!(
            cmd.argv(),
            vec![
                "--time=1:00:00", "-J", "train-mnist", "--qos=high", "train.sh", "--data", "mnist", "3", "--lr",
                "0.1", "--verbose",
            ]
        );
        assert_eq!(cmd.env, vec![("dataset".to_string(), "mnist".to_string())]);
    }

    #[test]
    fn test_dependency_goes_before_name() {
        let spec = group("g: { script: run.sh }");
        let cmd = build_command(&spec, &Binding::empty(), "g", &ctx(false))
            .unwrap()
            .with_dependency("afterok", &["1234".to_string(), "1235".to_string()]);
        assert_eq!(
            cmd.argv(),
            vec!["--dependency=afterok:1234:1235", "-J", "g", "--qos=high", "run.sh"]
        );
    }

    #[test]
    fn test_to_shell_with_env_and_prelude() {
        let spec = group("g: { script: run.sh, env: torch }");
        let binding = Binding::from_pairs([("NAME", ParamValue::from("a b"))]);
        let cmd = build_command(&spec, &binding, "g", &ctx(false)).unwrap();
        let line = cmd.to_shell();
        let rest = line
            .strip_prefix("source ~/.bashrc && conda activate torch && ")
            .unwrap();
        assert_eq!(
            shlex::split(rest).unwrap(),
            vec!["NAME=a b", "sbatch", "-J", "g", "--qos=high", "run.sh"]
        );
    }

    #[test]
    fn test_inline_command_wrapped() {
        let spec = group("g: { command: 'python eval.py {split}' }");
        let binding = Binding::from_pairs([("split", ParamValue::from("test"))]);
        let cmd = build_command(&spec, &binding, "g", &ctx(false)).unwrap();
        assert_eq!(cmd.target, vec!["--wrap=python eval.py test"]);
    }

    #[test]
    fn test_interactive_runs_in_login_shell() {
        let spec = group("g: { script: run.sh, slurm: '--time=1:00' }");
        let binding = Binding::from_pairs([("$in", ParamValue::from("x.txt"))]);
        let cmd = build_command(&spec, &binding, "g", &ctx(true)).unwrap();
        assert_eq!(cmd.mode, CommandMode::Interactive);
        assert_eq!(cmd.to_shell(), "bash -l run.sh x.txt");
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        let spec = group("g: { script: 'run-{missing}.sh' }");
        let err = build_command(&spec, &Binding::empty(), "g", &ctx(false)).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownParameter { .. }));
    }
}
