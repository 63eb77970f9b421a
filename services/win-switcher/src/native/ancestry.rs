//! 进程祖先链：从 OS 进程快照构造 pid -> ppid 表，沿父进程向上找拥有窗口的应用。

use std::collections::HashMap;

use sysinfo::{ProcessesToUpdate, System};

use super::WindowInfo;

/// 祖先链最大跳数，防止异常进程表造成死循环。
pub const MAX_ANCESTOR_HOPS: usize = 12;

/// pid -> ppid 映射快照。
#[derive(Debug, Clone, Default)]
pub struct ProcessTree {
    parents: HashMap<i32, i32>,
}

impl ProcessTree {
    /// 采集当前系统进程表（阻塞调用，需放在 blocking 线程中执行）。
    pub fn snapshot() -> Self {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let parents = sys
            .processes()
            .values()
            .filter_map(|process| {
                let parent = process.parent()?;
                Some((process.pid().as_u32() as i32, parent.as_u32() as i32))
            })
            .collect();
        Self { parents }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (i32, i32)>) -> Self {
        Self {
            parents: pairs.into_iter().collect(),
        }
    }

    pub fn parent_of(&self, pid: i32) -> Option<i32> {
        self.parents.get(&pid).copied()
    }
}

/// 从 `pid` 的父进程开始向上查找第一个拥有窗口的祖先。
///
/// 祖先拥有多个窗口且提供了 `cwd` 时，用 cwd 最后一段目录名匹配窗口标题；
/// 否则取该祖先的第一个窗口。
pub fn resolve_window_owner(
    tree: &ProcessTree,
    windows: &[WindowInfo],
    pid: i32,
    cwd: Option<&str>,
) -> Option<WindowInfo> {
    let mut by_pid: HashMap<i32, Vec<&WindowInfo>> = HashMap::new();
    for window in windows {
        by_pid.entry(window.pid).or_default().push(window);
    }

    let mut current = pid;
    for _ in 0..MAX_ANCESTOR_HOPS {
        let parent = tree.parent_of(current)?;
        if parent <= 1 {
            return None;
        }
        if let Some(owned) = by_pid.get(&parent)
            && let Some(first) = owned.first()
        {
            let picked = match cwd {
                Some(cwd) if owned.len() > 1 => {
                    let folder = cwd.split('/').filter(|part| !part.is_empty()).next_back();
                    folder
                        .and_then(|folder| {
                            owned
                                .iter()
                                .find(|window| window.title.contains(folder))
                        })
                        .unwrap_or(first)
                }
                _ => first,
            };
            return Some((*picked).clone());
        }
        current = parent;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{ProcessTree, resolve_window_owner};
    use crate::native::WindowInfo;

    fn window(id: u32, pid: i32, title: &str) -> WindowInfo {
        WindowInfo {
            id,
            title: title.to_string(),
            app: "Code".to_string(),
            pid,
            x: 0.0,
            y: 0.0,
            width: 800.0,
            height: 600.0,
            on_screen: true,
        }
    }

    #[test]
    fn walks_up_to_first_window_owner() {
        // claude(900) -> zsh(800) -> login(700) -> Terminal(600)
        let tree = ProcessTree::from_pairs([(900, 800), (800, 700), (700, 600), (600, 1)]);
        let windows = vec![window(11, 600, "zsh"), window(12, 42, "Other")];

        let owner = resolve_window_owner(&tree, &windows, 900, None).unwrap();
        assert_eq!(owner.id, 11);
    }

    #[test]
    fn process_own_windows_are_not_considered() {
        let tree = ProcessTree::from_pairs([(900, 1)]);
        let windows = vec![window(11, 900, "self")];
        assert!(resolve_window_owner(&tree, &windows, 900, None).is_none());
    }

    #[test]
    fn cwd_folder_disambiguates_multiple_windows() {
        let tree = ProcessTree::from_pairs([(900, 500), (500, 1)]);
        let windows = vec![
            window(21, 500, "portal - my-toolbox"),
            window(22, 500, "crate - rust-work"),
        ];

        let owner = resolve_window_owner(&tree, &windows, 900, Some("/Users/me/rust-work/crate/"))
            .unwrap();
        assert_eq!(owner.id, 22);

        let fallback =
            resolve_window_owner(&tree, &windows, 900, Some("/Users/me/unrelated")).unwrap();
        assert_eq!(fallback.id, 21);
    }

    #[test]
    fn walk_is_bounded_and_stops_on_cycles() {
        let tree = ProcessTree::from_pairs([(10, 11), (11, 10)]);
        assert!(resolve_window_owner(&tree, &[window(1, 99, "x")], 10, None).is_none());

        let chain = (100..=120).map(|pid| (pid, pid + 1)).collect::<Vec<_>>();
        let tree = ProcessTree::from_pairs(chain);
        // 第 13 跳才有窗口，超出上限。
        assert!(resolve_window_owner(&tree, &[window(1, 113, "far")], 100, None).is_none());
        assert_eq!(
            resolve_window_owner(&tree, &[window(2, 112, "near")], 100, None)
                .unwrap()
                .id,
            2
        );
    }
}
