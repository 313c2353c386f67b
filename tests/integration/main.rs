//! Integration tests for jusim

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn jusim() -> Command {
        cargo_bin_cmd!("jusim")
    }

    #[test]
    fn help_displays() {
        jusim()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("automatic per-project runtime images"));
    }

    #[test]
    fn version_displays() {
        jusim()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("jusim"));
    }

    #[test]
    fn completions_generate() {
        jusim()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("jusim"));
    }

    #[test]
    fn unknown_command_fails() {
        jusim().arg("frobnicate").assert().failure();
    }
}

mod workflow_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// Toolchain that writes a small image and prints a phase line
    const GOOD_TOOLCHAIN: &str = r#"
[toolchain]
executable = "/bin/sh"
version = "1.10.2"
args = ["-c", "echo 'PackageCompiler: compiling incremental system image'; printf image > \"$0\"", "{output}"]
"#;

    /// Toolchain that always fails
    const BROKEN_TOOLCHAIN: &str = r#"
[toolchain]
executable = "/bin/sh"
version = "1.10.2"
args = ["-c", "echo 'ERROR: PackageCompiler not installed' >&2; exit 2"]
"#;

    /// Isolated home, config and project for one test
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let project = dir.path().join("project");
            fs::create_dir_all(&project).unwrap();
            fs::write(
                project.join("Project.toml"),
                "name = \"Demo\"\n\n[deps]\nA = \"00000000-0000-0000-0000-000000000001\"\nB = \"00000000-0000-0000-0000-000000000002\"\n",
            )
            .unwrap();
            let sandbox = Self { dir };
            sandbox.use_toolchain(GOOD_TOOLCHAIN);
            sandbox
        }

        fn home(&self) -> PathBuf {
            self.dir.path().join("home")
        }

        fn project(&self) -> PathBuf {
            self.dir.path().join("project")
        }

        fn config(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn use_toolchain(&self, toml: &str) {
            fs::write(self.config(), toml).unwrap();
        }

        /// Executable toolchain whose `--version` and compile steps sleep
        fn use_slow_toolchain(&self, version_secs: u32, build_secs: u32) {
            use std::os::unix::fs::PermissionsExt;

            let script = self.dir.path().join("slow-julia");
            fs::write(
                &script,
                format!(
                    "#!/bin/sh\nif [ \"$1\" = --version ]; then sleep {version_secs}; echo 'julia version 1.10.2'; exit 0; fi\nsleep {build_secs}\nprintf image > \"$1\"\n"
                ),
            )
            .unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

            self.use_toolchain(&format!(
                "[toolchain]\nexecutable = \"{}\"\nargs = [\"{{output}}\"]\n",
                script.display()
            ));
        }

        /// Poll until `latest` names an image
        fn wait_for_image(&self, timeout: Duration) -> String {
            let deadline = Instant::now() + timeout;
            loop {
                let latest = self.latest();
                if !latest.is_empty() {
                    return latest;
                }
                assert!(Instant::now() < deadline, "no image after {:?}", timeout);
                std::thread::sleep(Duration::from_millis(200));
            }
        }

        /// Poll until no build holds the project lock
        fn wait_for_idle(&self, timeout: Duration) {
            let deadline = Instant::now() + timeout;
            loop {
                let output = self.cmd().arg("status").output().unwrap();
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                if !stdout.contains("running (pid") {
                    return;
                }
                assert!(Instant::now() < deadline, "build still running after {:?}", timeout);
                std::thread::sleep(Duration::from_millis(200));
            }
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("jusim");
            cmd.env("JUSIM_HOME", self.home())
                .env("JUSIM_CONFIG", self.config())
                .env("JUSIM_PROJECT", self.project())
                .env_remove("RUST_LOG");
            cmd
        }

        fn images(&self) -> Vec<PathBuf> {
            let Ok(entries) = fs::read_dir(self.home().join("images")) else {
                return Vec::new();
            };
            let mut images = Vec::new();
            for project_dir in entries.flatten() {
                for entry in fs::read_dir(project_dir.path()).unwrap().flatten() {
                    let path = entry.path();
                    let is_image = path.is_file()
                        && path.extension().is_some_and(|ext| ext != "json" && ext != "lock");
                    if is_image {
                        images.push(path);
                    }
                }
            }
            images.sort();
            images
        }

        fn latest(&self) -> String {
            let output = self.cmd().arg("latest").output().unwrap();
            assert!(output.status.success());
            String::from_utf8(output.stdout).unwrap().trim().to_string()
        }
    }

    fn hook_path(home: &Path) -> String {
        home.join("start.jl").display().to_string()
    }

    #[test]
    fn args_without_image_is_hook_only() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .arg("args")
            .assert()
            .success()
            .stdout(format!("-L {}\n", hook_path(&sandbox.home())));

        assert!(sandbox.home().join("start.jl").exists());
    }

    #[test]
    fn args_outside_project_is_hook_only() {
        let sandbox = Sandbox::new();
        let elsewhere = sandbox.dir.path().join("elsewhere");
        fs::create_dir_all(&elsewhere).unwrap();

        sandbox
            .cmd()
            .env("JUSIM_PROJECT", &elsewhere)
            .arg("args")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("-L "));
    }

    #[test]
    fn build_then_args_loads_image() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("Built"));

        let images = sandbox.images();
        assert_eq!(images.len(), 1);
        let image = images[0].display().to_string();

        sandbox
            .cmd()
            .arg("args")
            .assert()
            .success()
            .stdout(format!("-J {} -L {}\n", image, hook_path(&sandbox.home())));
        assert_eq!(sandbox.latest(), image);

        sandbox
            .cmd()
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("up to date"));
        assert_eq!(sandbox.images().len(), 1);
    }

    #[test]
    fn failed_build_keeps_previous_image() {
        let sandbox = Sandbox::new();
        sandbox.cmd().arg("build").assert().success();
        let before = sandbox.latest();

        sandbox.cmd().args(["add", "C"]).assert().success();
        sandbox.use_toolchain(BROKEN_TOOLCHAIN);

        sandbox
            .cmd()
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("PackageCompiler not installed"))
            .stderr(predicate::str::contains("Hint:"));

        assert_eq!(sandbox.latest(), before);
        assert_eq!(sandbox.images().len(), 1);
    }

    #[test]
    fn add_remove_show_in_status() {
        let sandbox = Sandbox::new();

        sandbox.cmd().args(["add", "C"]).assert().success();
        sandbox.cmd().args(["remove", "A"]).assert().success();

        let prefs = fs::read_to_string(sandbox.project().join("LocalPreferences.toml")).unwrap();
        assert!(prefs.contains("[jusim]"));

        sandbox
            .cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("A (excluded)"))
            .stdout(predicate::str::contains("C (added)"))
            .stdout(predicate::str::contains("stale"));
    }

    #[test]
    fn preference_change_rebuilds_and_clean_keeps_latest() {
        let sandbox = Sandbox::new();

        sandbox.cmd().arg("build").assert().success();
        sandbox.cmd().args(["remove", "A"]).assert().success();
        sandbox
            .cmd()
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("Built"));

        // housekeeping after the second build keeps only the newest image
        let latest = sandbox.latest();
        let images = sandbox.images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].display().to_string(), latest);

        sandbox
            .cmd()
            .args(["clean", "--keep", "1", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No old images"));
        assert_eq!(sandbox.latest(), latest);
    }

    #[test]
    fn latest_without_image_explains() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .arg("latest")
            .assert()
            .success()
            .stdout("")
            .stderr(predicate::str::contains("No image built"));
    }

    #[test]
    fn start_prints_capture_file_once_per_session() {
        let sandbox = Sandbox::new();
        fs::write(
            sandbox.config(),
            format!("{}\n[build]\nauto_rebuild = false\n", GOOD_TOOLCHAIN),
        )
        .unwrap();

        let pid = std::process::id().to_string();
        let first = sandbox
            .cmd()
            .args(["start", "--session-pid", &pid])
            .output()
            .unwrap();
        assert!(first.status.success());
        let capture = String::from_utf8(first.stdout).unwrap().trim().to_string();
        assert!(capture.ends_with(".jl"));
        assert!(Path::new(&capture).exists());

        let second = sandbox
            .cmd()
            .args(["start", "--session-pid", &pid])
            .output()
            .unwrap();
        assert!(second.status.success());
        assert_eq!(String::from_utf8(second.stdout).unwrap().trim(), capture);
    }

    #[test]
    fn start_does_not_wait_for_the_toolchain() {
        let sandbox = Sandbox::new();
        sandbox.use_slow_toolchain(3, 0);

        let began = Instant::now();
        let output = sandbox
            .cmd()
            .args(["start", "--session-pid", &std::process::id().to_string()])
            .output()
            .unwrap();
        let elapsed = began.elapsed();

        assert!(output.status.success());
        assert!(!String::from_utf8(output.stdout).unwrap().trim().is_empty());
        assert!(elapsed < Duration::from_secs(2), "start held the session for {:?}", elapsed);

        // the detached check finds no image and submits a build
        let image = sandbox.wait_for_image(Duration::from_secs(30));
        sandbox.wait_for_idle(Duration::from_secs(30));
        assert_eq!(sandbox.images().len(), 1);
        assert!(Path::new(&image).exists());
    }

    #[test]
    fn concurrent_background_builds_publish_one_image() {
        let sandbox = Sandbox::new();
        sandbox.use_slow_toolchain(0, 2);

        for _ in 0..2 {
            sandbox
                .cmd()
                .args(["build", "--background"])
                .assert()
                .success()
                .stdout(
                    predicate::str::contains("Background build started")
                        .or(predicate::str::contains("already running")),
                );
        }

        // nothing reports back; the result shows up through `latest`
        let image = sandbox.wait_for_image(Duration::from_secs(30));
        sandbox.wait_for_idle(Duration::from_secs(30));

        assert_eq!(sandbox.images().len(), 1);
        assert_eq!(sandbox.latest(), image);
        sandbox
            .cmd()
            .arg("args")
            .assert()
            .success()
            .stdout(format!("-J {} -L {}\n", image, hook_path(&sandbox.home())));
    }

    #[test]
    fn args_with_broken_config_still_succeeds() {
        let sandbox = Sandbox::new();
        sandbox.use_toolchain("this is = = not toml");

        sandbox
            .cmd()
            .arg("args")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("-L "));
    }

    #[test]
    fn status_with_broken_config_fails() {
        let sandbox = Sandbox::new();
        sandbox.use_toolchain("this is = = not toml");

        sandbox
            .cmd()
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn init_writes_config_and_hook() {
        let sandbox = Sandbox::new();
        fs::remove_file(sandbox.config()).unwrap();

        sandbox
            .cmd()
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote default config"));

        let config = fs::read_to_string(sandbox.config()).unwrap();
        assert!(config.contains("[toolchain]"));
        let hook = fs::read_to_string(sandbox.home().join("start.jl")).unwrap();
        assert!(hook.contains("jusim"));
    }

    #[test]
    fn config_show_and_path() {
        let sandbox = Sandbox::new();

        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));

        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[retention]"))
            .stdout(predicate::str::contains("/bin/sh"));
    }

    #[test]
    fn missing_project_fails_with_hint() {
        let sandbox = Sandbox::new();
        let elsewhere = sandbox.dir.path().join("elsewhere");
        fs::create_dir_all(&elsewhere).unwrap();

        sandbox
            .cmd()
            .env("JUSIM_PROJECT", &elsewhere)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No Project.toml"))
            .stderr(predicate::str::contains("Hint:"));
    }
}
