use std::collections::BTreeMap;

use grove_store::{Blob, FileType, Tree, TreeEntry};
use grove_types::Hash;

use crate::backing::FakeBackingStore;

#[derive(Clone)]
enum Node {
    Dir { children: BTreeMap<String, Node> },
    File { data: Vec<u8>, perms: u32 },
    Symlink { target: String },
}

impl Node {
    fn empty_dir() -> Self {
        Self::Dir {
            children: BTreeMap::new(),
        }
    }
}

/// Declarative builder for fake source-control trees.
///
/// Cloning a builder yields an independent copy of the path data, so a
/// second commit can be derived from a first by cloning and editing.
/// `finalize` writes every blob and tree into a [`FakeBackingStore`] and
/// returns the root tree hash; the builder itself stays editable and can be
/// finalized again (content addressing makes repeats idempotent).
#[derive(Clone)]
pub struct TreeBuilder {
    root: Node,
}

impl TreeBuilder {
    /// Create a builder with an empty root directory.
    pub fn new() -> Self {
        Self {
            root: Node::empty_dir(),
        }
    }

    /// Add a regular file with mode 0644, creating parent directories.
    /// Panics if an entry already exists at the path.
    pub fn set_file(&mut self, path: &str, contents: &str) {
        self.set_file_with_perms(path, contents.as_bytes(), 0o644);
    }

    /// Add a regular file with explicit permissions.
    pub fn set_file_with_perms(&mut self, path: &str, contents: &[u8], perms: u32) {
        let (dir, name) = self.dir_for(path, true);
        let prev = dir.insert(
            name,
            Node::File {
                data: contents.to_vec(),
                perms,
            },
        );
        assert!(
            prev.is_none(),
            "while building fake tree: an entry already exists at {path:?}"
        );
    }

    /// Add several files with mode 0644 in one call.
    pub fn set_files(&mut self, files: &[(&str, &str)]) {
        for (path, contents) in files {
            self.set_file(path, contents);
        }
    }

    /// Replace an existing file's contents, keeping mode 0644.
    /// Panics if no entry exists at the path.
    pub fn replace_file(&mut self, path: &str, contents: &str) {
        self.replace_file_with_perms(path, contents.as_bytes(), 0o644);
    }

    /// Replace an existing file's contents and permissions.
    pub fn replace_file_with_perms(&mut self, path: &str, contents: &[u8], perms: u32) {
        let (dir, name) = self.dir_for(path, false);
        assert!(
            dir.contains_key(&name),
            "while building fake tree: expected to replace entry at {path:?} \
             but no entry present with this name"
        );
        dir.insert(
            name,
            Node::File {
                data: contents.to_vec(),
                perms,
            },
        );
    }

    /// Remove an existing entry. Panics if no entry exists at the path.
    pub fn remove_file(&mut self, path: &str) {
        let (dir, name) = self.dir_for(path, false);
        assert!(
            dir.remove(&name).is_some(),
            "while building fake tree: expected to remove entry at {path:?} \
             but no entry present with this name"
        );
    }

    /// Create an empty directory at the path if one does not already exist.
    pub fn mkdir(&mut self, path: &str) {
        let (dir, name) = self.dir_for(path, true);
        dir.entry(name).or_insert_with(Node::empty_dir);
    }

    /// Add a symlink pointing at `target`.
    pub fn set_symlink(&mut self, path: &str, target: &str) {
        let (dir, name) = self.dir_for(path, true);
        let prev = dir.insert(
            name,
            Node::Symlink {
                target: target.to_string(),
            },
        );
        assert!(
            prev.is_none(),
            "while building fake tree: an entry already exists at {path:?}"
        );
    }

    /// Write every blob and tree into the backing store and return the root
    /// tree hash. When `ready` is false, every stored object starts gated.
    pub fn finalize(&self, store: &FakeBackingStore, ready: bool) -> Hash {
        match finalize_node(&self.root, store, ready) {
            (hash, FileType::Directory, _) => hash,
            _ => unreachable!("root is always a directory"),
        }
    }

    /// The root tree hash this builder would finalize to.
    pub fn root_hash(&self) -> Hash {
        node_summary(&self.root).0
    }

    /// The hash the entry at `path` would finalize to. Panics if no entry
    /// exists at the path.
    pub fn hash_of(&self, path: &str) -> Hash {
        let mut current = &self.root;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let children = match current {
                Node::Dir { children } => children,
                _ => panic!("no entry at {path:?}: {component:?} is not a directory"),
            };
            current = children
                .get(component)
                .unwrap_or_else(|| panic!("no entry at {path:?}"));
        }
        node_summary(current).0
    }

    /// Navigate to the parent directory of `path`, returning the child map
    /// and the final component. Creates intermediate directories when
    /// `create` is set, panics on missing or non-directory components
    /// otherwise.
    fn dir_for(&mut self, path: &str, create: bool) -> (&mut BTreeMap<String, Node>, String) {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let (name, parents) = components
            .split_last()
            .expect("while building fake tree: empty path");

        let mut current = &mut self.root;
        for component in parents {
            let node = current;
            let children = match node {
                Node::Dir { children } => children,
                _ => panic!("while building fake tree: {component:?} is not a directory"),
            };
            current = if create {
                children
                    .entry(component.to_string())
                    .or_insert_with(Node::empty_dir)
            } else {
                children.get_mut(*component).unwrap_or_else(|| {
                    panic!("while building fake tree: no directory at {component:?}")
                })
            };
        }
        match current {
            Node::Dir { children } => (children, name.to_string()),
            _ => panic!("while building fake tree: parent of {path:?} is not a directory"),
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash, type, and permissions a node would finalize to, computed without
/// touching a store.
fn node_summary(node: &Node) -> (Hash, FileType, u32) {
    match node {
        Node::File { data, perms } => (Hash::of_blob(data), FileType::Regular, *perms),
        Node::Symlink { target } => (Hash::of_blob(target.as_bytes()), FileType::Symlink, 0o777),
        Node::Dir { children } => {
            let entries = children
                .iter()
                .map(|(name, child)| {
                    let (hash, ftype, perms) = node_summary(child);
                    TreeEntry::new(name.clone(), hash, ftype, perms)
                })
                .collect();
            let tree = Tree::new(entries);
            let hash = tree.hash().expect("serialize tree");
            (hash, FileType::Directory, 0o755)
        }
    }
}

fn finalize_node(node: &Node, store: &FakeBackingStore, ready: bool) -> (Hash, FileType, u32) {
    match node {
        Node::File { data, perms } => {
            let hash = store.put_blob(&Blob::new(data.clone()), ready);
            (hash, FileType::Regular, *perms)
        }
        Node::Symlink { target } => {
            let hash = store.put_blob(&Blob::new(target.as_bytes().to_vec()), ready);
            (hash, FileType::Symlink, 0o777)
        }
        Node::Dir { children } => {
            let entries = children
                .iter()
                .map(|(name, child)| {
                    let (hash, ftype, perms) = finalize_node(child, store, ready);
                    TreeEntry::new(name.clone(), hash, ftype, perms)
                })
                .collect();
            let tree = Tree::new(entries);
            let hash = store.put_tree(&tree, ready);
            (hash, FileType::Directory, 0o755)
        }
    }
}
