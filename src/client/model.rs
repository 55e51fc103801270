use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<SceneRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRef {
    pub id: String,
    pub title: String,
    #[serde(rename = "jsonUrl", default, skip_serializing_if = "Option::is_none")]
    pub json_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRelease {
    pub version: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

impl Team {
    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }
}

impl Project {
    pub fn scene(&self, id: &str) -> Option<&SceneRef> {
        self.scenes.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_listing_deserializes() {
        let json = r#"[{
            "id": "t1", "title": "Studio",
            "projects": [{
                "id": "p1", "title": "Pilot",
                "scenes": [{"id": "s1", "title": "Opening", "jsonUrl": "https://cdn/s1.json"}]
            }]
        }]"#;
        let teams: Vec<Team> = serde_json::from_str(json).unwrap();
        let scene = teams[0].project("p1").unwrap().scene("s1").unwrap();
        assert_eq!(scene.json_url.as_deref(), Some("https://cdn/s1.json"));
    }

    #[test]
    fn missing_children_default_to_empty() {
        let team: Team = serde_json::from_str(r#"{"id": "t", "title": "Solo"}"#).unwrap();
        assert!(team.projects.is_empty());
    }
}
