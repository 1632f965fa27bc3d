use crate::project::ProjectTree;
use serde::{Deserialize, Serialize};

/// Entity whose preset references are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageTarget<'a> {
    Server(&'a str),
    Parent(&'a str),
    Route(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetUsage {
    pub folder_name: String,
    pub preset_name: String,
}

/// Every preset with at least one binding referencing `target`, in folder
/// and preset order.
pub fn used_in_presets(tree: &ProjectTree, target: UsageTarget<'_>) -> Vec<PresetUsage> {
    let mut usages = Vec::new();
    for (folder_name, folder) in &tree.presets {
        for (preset_name, preset) in &folder.presets_hash {
            let referenced = preset.routes.iter().any(|binding| match target {
                UsageTarget::Server(id) => binding.server_id == id,
                UsageTarget::Parent(id) => binding.parent_id == id,
                UsageTarget::Route(id) => binding.route_id == id,
            });
            if referenced {
                usages.push(PresetUsage {
                    folder_name: folder_name.clone(),
                    preset_name: preset_name.clone(),
                });
            }
        }
    }
    usages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::demo_tree;

    #[test]
    fn test_usage_by_each_target() {
        let tree = demo_tree();
        let expected = vec![PresetUsage {
            folder_name: "qa".to_string(),
            preset_name: "empty-list".to_string(),
        }];

        assert_eq!(used_in_presets(&tree, UsageTarget::Server("api")), expected);
        assert_eq!(used_in_presets(&tree, UsageTarget::Server("ghost")), expected);
        assert_eq!(used_in_presets(&tree, UsageTarget::Parent("users")), expected);
        assert_eq!(used_in_presets(&tree, UsageTarget::Route("list")), expected);
        assert!(used_in_presets(&tree, UsageTarget::Route("admin")).is_empty());
        assert!(used_in_presets(&tree, UsageTarget::Parent("gql")).is_empty());
    }
}
