//! 窗口去重：按进程收敛助手返回的窗口列表。
//!
//! 规则：
//! - 面积为 0 的窗口一律丢弃。
//! - 进程有带标题窗口时，每个标题保留一个（在屏优先，其次面积大者）。
//! - 进程只有无标题窗口时，最多保留一个在屏的最大窗口。
//! 保留下来的窗口维持助手原始顺序（即前后层级顺序）。

use std::collections::HashMap;

use super::WindowInfo;

pub fn dedupe_windows(windows: Vec<WindowInfo>) -> Vec<WindowInfo> {
    let mut by_pid: HashMap<i32, Vec<usize>> = HashMap::new();
    for (index, window) in windows.iter().enumerate() {
        if window.area() > 0.0 {
            by_pid.entry(window.pid).or_default().push(index);
        }
    }

    let mut keep = vec![false; windows.len()];
    for indexes in by_pid.values() {
        let titled = indexes
            .iter()
            .copied()
            .filter(|index| !windows[*index].title.trim().is_empty())
            .collect::<Vec<_>>();

        if titled.is_empty() {
            let largest = indexes
                .iter()
                .copied()
                .filter(|index| windows[*index].on_screen)
                .fold(None::<usize>, |best, index| match best {
                    Some(current) if windows[current].area() >= windows[index].area() => {
                        Some(current)
                    }
                    _ => Some(index),
                });
            if let Some(index) = largest {
                keep[index] = true;
            }
            continue;
        }

        let mut best_by_title: HashMap<&str, usize> = HashMap::new();
        for index in titled {
            let title = windows[index].title.as_str();
            let replace = best_by_title
                .get(title)
                .is_none_or(|current| is_better(&windows[index], &windows[*current]));
            if replace {
                best_by_title.insert(title, index);
            }
        }
        for index in best_by_title.into_values() {
            keep[index] = true;
        }
    }

    windows
        .into_iter()
        .zip(keep)
        .filter_map(|(window, kept)| kept.then_some(window))
        .collect()
}

/// 候选窗口是否优于当前保留窗口；完全相同时保留先出现者。
fn is_better(candidate: &WindowInfo, current: &WindowInfo) -> bool {
    if candidate.on_screen != current.on_screen {
        return candidate.on_screen;
    }
    candidate.area() > current.area()
}
