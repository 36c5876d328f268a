//! 持久化翻译缓存
//!
//! 翻译过的文本按 `文本|源→目标[|上下文]` 键缓存，进程内用并发
//! 映射，每次写入同步落盘成 JSON。同一批 PO 文件反复跑翻译时
//! 命中率通常在九成以上。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::TranslationResult;

/// 缓存统计快照
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        self.hits as f64 / total.max(1) as f64
    }
}

/// 翻译缓存
pub struct TranslationCache {
    path: Option<PathBuf>,
    map: DashMap<String, String>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    dirty: AtomicBool,
    /// 串行化落盘，并发写穿不得交错写同一个文件
    flush_lock: Mutex<()>,
}

impl TranslationCache {
    /// 纯内存缓存（测试和一次性运行用）
    pub fn in_memory() -> Self {
        Self {
            path: None,
            map: DashMap::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    /// 打开磁盘缓存
    ///
    /// 文件不存在或内容损坏时从空缓存开始，损坏只记警告，
    /// 下一次落盘会覆盖掉坏文件。
    pub fn open(path: impl AsRef<Path>) -> TranslationResult<Self> {
        let path = path.as_ref().to_path_buf();
        let map = DashMap::new();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<std::collections::HashMap<String, String>>(&raw) {
                Ok(parsed) => {
                    for (k, v) in parsed {
                        map.insert(k, v);
                    }
                    info!("已加载翻译缓存: {} 条 ({})", map.len(), path.display());
                }
                Err(e) => {
                    warn!("缓存文件损坏, 从空缓存开始 {}: {}", path.display(), e);
                }
            }
        }
        Ok(Self {
            path: Some(path),
            map,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        })
    }

    /// 生成缓存键
    pub fn make_key(text: &str, source: &str, target: &str, context: Option<&str>) -> String {
        match context {
            Some(ctx) if !ctx.is_empty() => {
                format!("{}|{}→{}|{}", text, source, target, ctx)
            }
            _ => format!("{}|{}→{}", text, source, target),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self.map.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 写入并立即落盘（写穿），落盘失败不阻塞翻译流程
    pub fn insert(&self, key: String, translation: String) {
        self.map.insert(key, translation);
        self.dirty.store(true, Ordering::Relaxed);
        if let Err(e) = self.flush() {
            warn!("缓存写穿失败: {}", e);
        }
    }

    /// 落盘（仅当有变化且配置了路径）
    pub fn flush(&self) -> TranslationResult<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        // 持锁期间检查脏标记, 晚到的写入会再触发一次落盘
        let _guard = self.flush_lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        let snapshot: std::collections::HashMap<String, String> = self
            .map
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, json)?;
        debug!("翻译缓存已落盘: {} 条", snapshot.len());
        Ok(())
    }

    /// 清空缓存并删除磁盘文件
    pub fn clear(&self) -> TranslationResult<()> {
        self.map.clear();
        self.dirty.store(false, Ordering::Relaxed);
        if let Some(path) = &self.path {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        info!("翻译缓存已清空");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.map.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl Drop for TranslationCache {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("退出时缓存落盘失败: {}", e);
        }
    }
}
