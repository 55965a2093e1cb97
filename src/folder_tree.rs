//! Playlist folders as an arena keyed by id.
//!
//! Parent links are only trusted after walking them; stored data can be corrupt, so every
//! walk carries a visited set and stops on the first repeat.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::models::{Playlist, PlaylistFolder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentCheck {
    Ok,
    /// The new parent is the folder itself or one of its descendants.
    Cycle,
    /// The new parent's own ancestor chain loops without reaching the root.
    CorruptChain,
    UnknownParent,
}

#[derive(Debug, Serialize)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub playlist_ids: Vec<String>,
    pub children: Vec<FolderNode>,
}

#[derive(Debug, Serialize)]
pub struct FolderTree {
    pub folders: Vec<FolderNode>,
    /// Playlists not filed under any folder.
    pub root_playlist_ids: Vec<String>,
}

pub struct FolderArena {
    folders: HashMap<String, PlaylistFolder>,
}

impl FolderArena {
    pub fn new(folders: Vec<PlaylistFolder>) -> Self {
        Self {
            folders: folders.into_iter().map(|f| (f.id.clone(), f)).collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.folders.contains_key(id)
    }

    /// Checks whether `folder_id` may be moved under `new_parent`.
    pub fn check_parent(&self, folder_id: &str, new_parent: Option<&str>) -> ParentCheck {
        let Some(start) = new_parent else {
            return ParentCheck::Ok;
        };
        if !self.folders.contains_key(start) {
            return ParentCheck::UnknownParent;
        }

        let mut visited = HashSet::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if id == folder_id {
                return ParentCheck::Cycle;
            }
            if !visited.insert(id) {
                return ParentCheck::CorruptChain;
            }
            current = self
                .folders
                .get(id)
                .and_then(|f| f.parent_id.as_deref());
        }

        ParentCheck::Ok
    }

    /// Builds the nested view. Folders whose parent is missing are shown at the top level.
    /// Folders caught in a parent loop are dropped and their playlists listed at the root.
    pub fn build_tree(&self, playlists: &[Playlist]) -> FolderTree {
        let mut children: HashMap<Option<&str>, Vec<&PlaylistFolder>> = HashMap::new();
        for folder in self.folders.values() {
            let parent = folder
                .parent_id
                .as_deref()
                .filter(|p| self.folders.contains_key(*p));
            children.entry(parent).or_default().push(folder);
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        }

        let mut playlists_by_folder: HashMap<&str, Vec<String>> = HashMap::new();
        let mut root_playlist_ids = Vec::new();
        for playlist in playlists {
            match playlist.folder_id.as_deref() {
                Some(folder) if self.folders.contains_key(folder) => playlists_by_folder
                    .entry(folder)
                    .or_default()
                    .push(playlist.id.clone()),
                _ => root_playlist_ids.push(playlist.id.clone()),
            }
        }

        let mut visited = HashSet::new();
        let folders = Self::nodes(None, &children, &playlists_by_folder, &mut visited);

        // Playlists filed in a dropped folder surface at the root.
        for playlist in playlists {
            if let Some(folder) = playlist.folder_id.as_deref() {
                if self.folders.contains_key(folder) && !visited.contains(folder) {
                    root_playlist_ids.push(playlist.id.clone());
                }
            }
        }

        FolderTree {
            folders,
            root_playlist_ids,
        }
    }

    fn nodes<'a>(
        parent: Option<&'a str>,
        children: &HashMap<Option<&'a str>, Vec<&'a PlaylistFolder>>,
        playlists: &HashMap<&str, Vec<String>>,
        visited: &mut HashSet<&'a str>,
    ) -> Vec<FolderNode> {
        let Some(list) = children.get(&parent) else {
            return Vec::new();
        };

        let mut nodes = Vec::with_capacity(list.len());
        for &folder in list {
            if !visited.insert(folder.id.as_str()) {
                continue;
            }
            nodes.push(FolderNode {
                id: folder.id.clone(),
                name: folder.name.clone(),
                parent_id: folder.parent_id.clone(),
                playlist_ids: playlists.get(folder.id.as_str()).cloned().unwrap_or_default(),
                children: Self::nodes(Some(folder.id.as_str()), children, playlists, visited),
            });
        }
        nodes
    }
}
