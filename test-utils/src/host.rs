//! In-memory stand-in for the host utilities.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glusterblock::{CommandOutput, Host};
use parking_lot::Mutex;

const DEFAULT_MAX_LOOP_DEVICES: u32 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Mount {
    source: String,
    target: PathBuf,
    fstype: String,
}

#[derive(Debug)]
struct State {
    mounts: Vec<Mount>,
    loops: BTreeMap<u32, PathBuf>,
    formatted: HashMap<PathBuf, String>,
    max_loops: u32,
    gluster_failures: u32,
    mkfs_fails: bool,
    commands: Vec<String>,
}

/// Simulates `glusterfs`, `mount`, `umount`, `losetup` and `mkfs.*`.
///
/// Backing files are real files (usually in a temp dir); mounts and loop
/// devices only exist in the fake's tables, which back
/// [`Host::mount_table`]. Helpers let tests inject failures and simulate
/// drift behind the driver's back.
#[derive(Debug)]
pub struct FakeHost {
    state: Mutex<State>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                mounts: Vec::new(),
                loops: BTreeMap::new(),
                formatted: HashMap::new(),
                max_loops: DEFAULT_MAX_LOOP_DEVICES,
                gluster_failures: 0,
                mkfs_fails: false,
                commands: Vec::new(),
            }),
        }
    }

    /// Fail the next `count` glusterfs invocations.
    pub fn fail_gluster_mounts(&self, count: u32) {
        self.state.lock().gluster_failures = count;
    }

    pub fn fail_mkfs(&self, fail: bool) {
        self.state.lock().mkfs_fails = fail;
    }

    pub fn set_max_loop_devices(&self, max: u32) {
        self.state.lock().max_loops = max;
    }

    /// Every command run so far, as `program arg...`.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// How many times `program` ran.
    pub fn count(&self, program: &str) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(program))
            .count()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    pub fn is_mounted(&self, target: &Path) -> bool {
        self.state.lock().mounts.iter().any(|m| m.target == target)
    }

    /// Source of the top mount at `target`.
    pub fn mount_source(&self, target: &Path) -> Option<String> {
        self.state
            .lock()
            .mounts
            .iter()
            .rev()
            .find(|m| m.target == target)
            .map(|m| m.source.clone())
    }

    /// Loop devices bound to `file`.
    pub fn devices_for(&self, file: &Path) -> Vec<PathBuf> {
        self.state
            .lock()
            .loops
            .iter()
            .filter(|(_, backing)| backing.as_path() == file)
            .map(|(index, _)| device_path(*index))
            .collect()
    }

    pub fn loop_device_count(&self) -> usize {
        self.state.lock().loops.len()
    }

    /// Filesystem `file` was last formatted with.
    pub fn formatted_as(&self, file: &Path) -> Option<String> {
        self.state.lock().formatted.get(file).cloned()
    }

    /// Remove the mount at `target` as an outside actor would.
    pub fn drop_mount(&self, target: &Path) {
        self.state.lock().mounts.retain(|m| m.target != target);
    }

    /// Detach a loop device as an outside actor would.
    pub fn drop_loop_device(&self, device: &Path) {
        let mut state = self.state.lock();
        state.loops.retain(|index, _| device_path(*index) != device);
        state.mounts.retain(|m| Path::new(&m.source) != device);
    }

    /// Bind `file` to an extra loop device behind the driver's back.
    pub fn attach_stray(&self, file: &Path) -> PathBuf {
        let mut state = self.state.lock();
        let index = (0..).find(|i| !state.loops.contains_key(i)).unwrap_or(0);
        state.loops.insert(index, file.to_path_buf());
        device_path(index)
    }

    /// Mount `source` at `target` behind the driver's back.
    pub fn mount_stray(&self, source: &str, target: &Path, fstype: &str) {
        self.state.lock().mounts.push(Mount {
            source: source.to_string(),
            target: target.to_path_buf(),
            fstype: fstype.to_string(),
        });
    }

    /// Forget every mount and loop device, as after a host reboot.
    pub fn simulate_reboot(&self) {
        let mut state = self.state.lock();
        state.mounts.clear();
        state.loops.clear();
    }

    fn glusterfs(&self, args: &[String]) -> CommandOutput {
        let mut state = self.state.lock();
        if state.gluster_failures > 0 {
            state.gluster_failures -= 1;
            return failure(1, "Mount failed. Check the log file for more details.");
        }

        let servers: Vec<&str> = args
            .iter()
            .filter_map(|a| a.strip_prefix("--volfile-server="))
            .collect();
        let Some(volume) = args.iter().find_map(|a| a.strip_prefix("--volfile-id=")) else {
            return failure(1, "glusterfs: no volfile id");
        };
        let Some(target) = args.last().map(PathBuf::from) else {
            return failure(1, "glusterfs: no mount point");
        };
        if !target.is_dir() {
            return failure(1, "glusterfs: mount point does not exist");
        }

        state.mounts.push(Mount {
            source: format!("{}:/{}", servers.join(","), volume),
            target,
            fstype: "fuse.glusterfs".to_string(),
        });
        success("")
    }

    fn mount(&self, args: &[String]) -> CommandOutput {
        let [flag, fstype, device, target] = args else {
            return failure(1, "mount: bad usage");
        };
        if flag != "-t" {
            return failure(1, "mount: bad usage");
        }
        let target = PathBuf::from(target);
        if !target.is_dir() {
            return failure(32, "mount: mount point does not exist");
        }

        let mut state = self.state.lock();
        if !state.loops.keys().any(|i| device_path(*i) == Path::new(device)) {
            return failure(32, "mount: special device does not exist");
        }
        state.mounts.push(Mount {
            source: device.clone(),
            target,
            fstype: fstype.clone(),
        });
        success("")
    }

    fn umount(&self, args: &[String]) -> CommandOutput {
        let Some(target) = args.last() else {
            return failure(1, "umount: bad usage");
        };
        let mut state = self.state.lock();
        match state
            .mounts
            .iter()
            .rposition(|m| m.target == Path::new(target))
        {
            Some(position) => {
                state.mounts.remove(position);
                success("")
            }
            None => failure(32, &format!("umount: {target}: not mounted.")),
        }
    }

    fn losetup(&self, args: &[String]) -> CommandOutput {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut state = self.state.lock();
        match args.as_slice() {
            ["--find", "--show", file] => {
                if !Path::new(file).is_file() {
                    return failure(
                        1,
                        &format!("losetup: {file}: failed to set up loop device: No such file or directory"),
                    );
                }
                let max = state.max_loops;
                let Some(index) = (0..max).find(|i| !state.loops.contains_key(i)) else {
                    return failure(1, "losetup: cannot find an unused loop device");
                };
                state.loops.insert(index, PathBuf::from(file));
                success(&format!("{}\n", device_path(index).display()))
            }
            ["--detach", device] => {
                let before = state.loops.len();
                state.loops.retain(|i, _| device_path(*i) != Path::new(device));
                if state.loops.len() == before {
                    return failure(
                        1,
                        &format!("losetup: {device}: detach failed: No such device or address"),
                    );
                }
                success("")
            }
            ["--associated", file] => {
                let stdout: String = state
                    .loops
                    .iter()
                    .filter(|(_, backing)| backing.as_path() == Path::new(file))
                    .map(|(i, backing)| {
                        format!(
                            "{}: [2049]:1316 ({})\n",
                            device_path(*i).display(),
                            backing.display()
                        )
                    })
                    .collect();
                success(&stdout)
            }
            _ => failure(1, "losetup: unsupported invocation"),
        }
    }

    fn mkfs(&self, program: &str, args: &[String]) -> CommandOutput {
        let mut state = self.state.lock();
        if state.mkfs_fails {
            return failure(1, &format!("{program}: simulated failure"));
        }
        let Some(file) = args.last().map(PathBuf::from) else {
            return failure(1, &format!("{program}: no device given"));
        };
        if !file.is_file() {
            return failure(1, &format!("{program}: {}: No such file", file.display()));
        }
        let fstype = program.trim_start_matches("mkfs.").to_string();
        state.formatted.insert(file, fstype);
        success("")
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let line = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.state.lock().commands.push(line);

        Ok(match program {
            "glusterfs" => self.glusterfs(args),
            "mount" => self.mount(args),
            "umount" => self.umount(args),
            "losetup" => self.losetup(args),
            mkfs if mkfs.starts_with("mkfs.") => self.mkfs(mkfs, args),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{other}: command not found"),
                ));
            }
        })
    }

    async fn mount_table(&self) -> io::Result<String> {
        Ok(self
            .state
            .lock()
            .mounts
            .iter()
            .map(|m| {
                format!(
                    "{} {} {} rw,relatime 0 0\n",
                    escape(&m.source),
                    escape(&m.target.display().to_string()),
                    m.fstype
                )
            })
            .collect())
    }
}

fn device_path(index: u32) -> PathBuf {
    PathBuf::from(format!("/dev/loop{index}"))
}

fn escape(field: &str) -> String {
    field
        .replace('\\', "\\134")
        .replace(' ', "\\040")
        .replace('\t', "\\011")
        .replace('\n', "\\012")
}

fn success(stdout: &str) -> CommandOutput {
    CommandOutput {
        status: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failure(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        status: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}
