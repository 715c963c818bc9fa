use serde::{Deserialize, Serialize};

/// Directed connection from an output of one node to an input of another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentLink {
    pub source_node_id: i64,
    /// Output name on the source node
    pub source_output: String,
    /// Input name on the target node
    pub target_input: String,
}

impl ComponentLink {
    pub fn new(
        source_node_id: i64,
        source_output: impl Into<String>,
        target_input: impl Into<String>,
    ) -> Self {
        Self {
            source_node_id,
            source_output: source_output.into(),
            target_input: target_input.into(),
        }
    }
}

/// Node of the static workflow graph. Read-only for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: i64,
    pub workflow_id: i64,
    pub component_id: String,
    pub level: i32,
    pub incoming_links: Vec<ComponentLink>,
    /// Member node ids, when this node is a node group
    pub group_node_ids: Option<Vec<i64>>,
}

impl WorkflowNode {
    pub fn new(id: i64, workflow_id: i64, component_id: impl Into<String>) -> Self {
        Self {
            id,
            workflow_id,
            component_id: component_id.into(),
            level: 1,
            incoming_links: Vec::new(),
            group_node_ids: None,
        }
    }

    pub fn with_link(mut self, link: ComponentLink) -> Self {
        self.incoming_links.push(link);
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn as_group(mut self, member_ids: Vec<i64>) -> Self {
        self.group_node_ids = Some(member_ids);
        self
    }

    pub fn is_group(&self) -> bool {
        self.group_node_ids.is_some()
    }

    /// Distinct ids of the nodes this node receives data from
    pub fn parent_ids(&self) -> Vec<i64> {
        let mut parents: Vec<i64> = Vec::new();
        for link in &self.incoming_links {
            if !parents.contains(&link.source_node_id) {
                parents.push(link.source_node_id);
            }
        }
        parents
    }

    pub fn is_child_of(&self, node_id: i64) -> bool {
        self.incoming_links
            .iter()
            .any(|link| link.source_node_id == node_id)
    }
}

/// Nodes among `candidates` that have an incoming link from `parent`
pub fn find_children<'a>(candidates: &'a [WorkflowNode], parent: &WorkflowNode) -> Vec<&'a WorkflowNode> {
    candidates
        .iter()
        .filter(|node| node.id != parent.id && node.is_child_of(parent.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_follow_incoming_links() {
        let a = WorkflowNode::new(1, 1, "a");
        let b = WorkflowNode::new(2, 1, "b").with_link(ComponentLink::new(1, "out", "in"));
        let c = WorkflowNode::new(3, 1, "c").with_link(ComponentLink::new(1, "out", "in"));
        let d = WorkflowNode::new(4, 1, "d")
            .with_link(ComponentLink::new(2, "out", "left"))
            .with_link(ComponentLink::new(3, "out", "right"));
        let nodes = vec![a.clone(), b.clone(), c, d.clone()];

        let ids: Vec<i64> = find_children(&nodes, &a).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(find_children(&nodes, &b)[0].id, 4);
        assert!(find_children(&nodes, &d).is_empty());
        assert_eq!(d.parent_ids(), vec![2, 3]);
    }
}
