//! OpenFlow rules in ovs-ofctl syntax

use std::fmt;

use overlay_api::Vnid;

/// A single flow entry.
///
/// Rendered as `table=T,priority=P[,cookie=C][,matches],actions=A`, the
/// form `ovs-ofctl add-flow` accepts. A rule without a table only makes
/// sense as a deletion filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRule {
    pub table: Option<u8>,
    pub priority: u16,
    pub matches: Vec<String>,
    pub actions: Vec<String>,
    pub cookie: Option<u64>,
}

impl FlowRule {
    pub fn new(table: u8, priority: u16) -> Self {
        Self {
            table: Some(table),
            priority,
            matches: Vec::new(),
            actions: Vec::new(),
            cookie: None,
        }
    }

    /// Filter selecting every flow of one network, in any table
    pub fn network(vnid: Vnid) -> Self {
        Self {
            table: None,
            priority: 0,
            matches: Vec::new(),
            actions: Vec::new(),
            cookie: None,
        }
        .for_vnid(vnid)
    }

    pub fn matching(mut self, field: impl Into<String>) -> Self {
        self.matches.push(field.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Tag the rule with a network so a flush of that network removes it
    pub fn for_vnid(mut self, vnid: Vnid) -> Self {
        self.cookie = Some(vnid.cookie());
        self
    }

    /// Match spec used by `del-flows`: everything except priority and actions
    pub fn match_spec(&self) -> String {
        let mut parts = Vec::new();
        if let Some(table) = self.table {
            parts.push(format!("table={}", table));
        }
        if let Some(cookie) = self.cookie {
            parts.push(format!("cookie={:#x}/-1", cookie));
        }
        parts.extend(self.matches.iter().cloned());
        parts.join(",")
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = self.table {
            write!(f, "table={},", table)?;
        }
        write!(f, "priority={}", self.priority)?;
        if let Some(cookie) = self.cookie {
            write!(f, ",cookie={:#x}", cookie)?;
        }
        for field in &self.matches {
            write!(f, ",{}", field)?;
        }
        let actions = if self.actions.is_empty() {
            "drop".to_string()
        } else {
            self.actions.join(",")
        };
        write!(f, ",actions={}", actions)
    }
}

/// Base pipeline installed at bootstrap.
///
/// Traffic from the tunnel port goes to table 1, which hands it to the tap;
/// traffic from the tap goes to table 2 where per-network rules live.
pub fn skeleton(tunnel_port: u32, tap_port: u32) -> Vec<FlowRule> {
    vec![
        FlowRule::new(0, 200)
            .matching(format!("in_port={}", tunnel_port))
            .action("goto_table:1"),
        FlowRule::new(0, 50)
            .matching(format!("in_port={}", tap_port))
            .action("goto_table:2"),
        FlowRule::new(1, 100).action(format!("output:{}", tap_port)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_rendering() {
        let rendered: Vec<String> = skeleton(10, 3).iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "table=0,priority=200,in_port=10,actions=goto_table:1",
                "table=0,priority=50,in_port=3,actions=goto_table:2",
                "table=1,priority=100,actions=output:3",
            ]
        );
    }

    #[test]
    fn test_cookie_and_match_spec() {
        let rule = FlowRule::new(2, 100)
            .for_vnid(Vnid(0xc2))
            .matching("dl_dst=10:20:30:00:00:01")
            .action("output:11");

        assert_eq!(
            rule.to_string(),
            "table=2,priority=100,cookie=0xc2,dl_dst=10:20:30:00:00:01,actions=output:11"
        );
        assert_eq!(rule.match_spec(), "table=2,cookie=0xc2/-1,dl_dst=10:20:30:00:00:01");
        assert_eq!(FlowRule::network(Vnid(7)).match_spec(), "cookie=0x7/-1");
    }

    #[test]
    fn test_empty_actions_drop() {
        assert_eq!(FlowRule::new(2, 1).to_string(), "table=2,priority=1,actions=drop");
    }
}
