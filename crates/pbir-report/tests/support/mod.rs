#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

/// A throwaway `<Name>.Report` folder built up file by file.
pub struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("Sales.Report");
        fs::create_dir_all(root.join("definition")).expect("create definition");
        let fixture = Self { _dir: dir, root };
        fixture.write("report.json", &json!({"themeCollection": {}}));
        fixture
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn parent(&self) -> &Path {
        self.root.parent().expect("report has a parent")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join("definition").join(rel)
    }

    pub fn write(&self, rel: &str, value: &Value) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().expect("file has a parent")).expect("create dirs");
        fs::write(&path, serde_json::to_string_pretty(value).expect("serialize"))
            .expect("write fixture");
    }

    pub fn read(&self, rel: &str) -> Value {
        let text = fs::read_to_string(self.path(rel)).expect("read fixture");
        serde_json::from_str(&text).expect("parse fixture")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    pub fn pages(&self, order: &[&str], active: &str) {
        self.write(
            "pages/pages.json",
            &json!({"pageOrder": order, "activePageName": active}),
        );
    }

    pub fn page(&self, id: &str, page: Value) {
        self.write(&format!("pages/{id}/page.json"), &page);
    }

    pub fn visual(&self, page: &str, id: &str, visual: Value) {
        self.write(&format!("pages/{page}/visuals/{id}/visual.json"), &visual);
    }

    /// A page folder with an existing but empty `visuals/` directory.
    pub fn empty_page(&self, id: &str) {
        self.page(id, json!({"name": id, "displayName": id}));
        fs::create_dir_all(self.path(&format!("pages/{id}/visuals"))).expect("create visuals");
    }

    pub fn measures(&self, entity: &str, measures: &[(&str, &str)]) {
        let measures: Vec<Value> = measures
            .iter()
            .map(|(name, expression)| json!({"name": name, "expression": expression}))
            .collect();
        self.write(
            "reportExtensions.json",
            &json!({"name": "extension", "entities": [{"name": entity, "measures": measures}]}),
        );
    }

    pub fn bookmark(&self, name: &str, page: &str, containers: Value) {
        self.write(
            &format!("bookmarks/{name}.bookmark.json"),
            &json!({
                "name": name,
                "displayName": name,
                "explorationState": {
                    "activeSection": page,
                    "sections": {page: {"visualContainers": containers}}
                }
            }),
        );
    }

    /// Every `.json` file below the report, with its contents.
    pub fn snapshot(&self) -> Vec<(PathBuf, String)> {
        let mut files: Vec<(PathBuf, String)> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let text = fs::read_to_string(entry.path()).expect("read snapshot file");
                (entry.path().to_path_buf(), text)
            })
            .collect();
        files.sort();
        files
    }
}

pub fn card(name: &str, table: &str, measure: &str) -> Value {
    json!({
        "name": name,
        "visual": {
            "visualType": "card",
            "query": {"queryState": {"Values": {"projections": [{
                "field": {"Measure": {
                    "Expression": {"SourceRef": {"Entity": table}},
                    "Property": measure
                }},
                "queryRef": format!("{table}.{measure}")
            }]}}}
        }
    })
}

pub fn hidden(mut visual: Value) -> Value {
    visual["isHidden"] = json!(true);
    visual
}

pub fn navigator(name: &str, group_literal: Option<&str>) -> Value {
    let objects = match group_literal {
        Some(literal) => json!({"bookmarks": [{"properties": {
            "bookmarkGroup": {"expr": {"Literal": {"Value": literal}}}
        }}]}),
        None => json!({"bookmarks": [{"properties": {}}]}),
    };
    json!({
        "name": name,
        "visual": {"visualType": "bookmarkNavigator", "objects": objects}
    })
}
