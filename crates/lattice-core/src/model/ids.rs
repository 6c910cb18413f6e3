//! Deterministic node id synthesis.
//!
//! Every id is `"<projectId>:<localKey>"` where the local key starts with
//! the entity kind. Ids are stable across rebuilds for unchanged content,
//! which is what makes upserts idempotent.

/// `"<project>:file:<relativePath>"`
pub fn file_id(project_id: &str, relative_path: &str) -> String {
    format!("{project_id}:file:{relative_path}")
}

/// `"<project>:folder:<relativePath>"`
pub fn folder_id(project_id: &str, relative_path: &str) -> String {
    format!("{project_id}:folder:{relative_path}")
}

/// `"<project>:function:<relativePath>:<name>:<ordinal>"`
pub fn function_id(project_id: &str, relative_path: &str, name: &str, ordinal: usize) -> String {
    format!("{project_id}:function:{relative_path}:{name}:{ordinal}")
}

/// `"<project>:class:<relativePath>:<name>:<ordinal>"`
pub fn class_id(project_id: &str, relative_path: &str, name: &str, ordinal: usize) -> String {
    format!("{project_id}:class:{relative_path}:{name}:{ordinal}")
}

/// `"<project>:variable:<relativePath>:<name>:<ordinal>"`
pub fn variable_id(project_id: &str, relative_path: &str, name: &str, ordinal: usize) -> String {
    format!("{project_id}:variable:{relative_path}:{name}:{ordinal}")
}

/// `"<project>:import:<relativePath>:<ordinal>"`
pub fn import_id(project_id: &str, relative_path: &str, ordinal: usize) -> String {
    format!("{project_id}:import:{relative_path}:{ordinal}")
}

/// `"<project>:export:<relativePath>:<name>"`
pub fn export_id(project_id: &str, relative_path: &str, name: &str) -> String {
    format!("{project_id}:export:{relative_path}:{name}")
}

/// `"<project>:suite:<relativePath>:<name>:<ordinal>"`
pub fn test_suite_id(project_id: &str, relative_path: &str, name: &str, ordinal: usize) -> String {
    format!("{project_id}:suite:{relative_path}:{name}:{ordinal}")
}

/// `"<project>:doc:<relativePath>"`
pub fn doc_id(project_id: &str, relative_path: &str) -> String {
    format!("{project_id}:doc:{relative_path}")
}

/// `"<project>:sec:<relativePath>:<sectionIndex>"`
pub fn section_id(project_id: &str, relative_path: &str, section_index: usize) -> String {
    format!("{project_id}:sec:{relative_path}:{section_index}")
}

/// `"<project>:feature:<name>"`
pub fn feature_id(project_id: &str, name: &str) -> String {
    format!("{project_id}:feature:{name}")
}

/// Class ids are synthesized for EXTENDS/IMPLEMENTS parents from the bare
/// name with any generic suffix stripped (`Base<T>` → `Base`). The parent
/// may live in another file, so the id carries no path or ordinal.
pub fn class_ref_id(project_id: &str, raw_name: &str) -> String {
    let stripped = raw_name.split('<').next().unwrap_or(raw_name).trim();
    format!("{project_id}:classref:{stripped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic() {
        assert_eq!(
            function_id("proj", "src/a.ts", "foo", 0),
            function_id("proj", "src/a.ts", "foo", 0),
        );
        assert_eq!(file_id("p", "src/a.ts"), "p:file:src/a.ts");
        assert_eq!(section_id("p", "README.md", 2), "p:sec:README.md:2");
    }

    #[test]
    fn class_ref_strips_generics() {
        assert_eq!(class_ref_id("p", "Base<T, U>"), "p:classref:Base");
        assert_eq!(class_ref_id("p", "Plain"), "p:classref:Plain");
    }
}
