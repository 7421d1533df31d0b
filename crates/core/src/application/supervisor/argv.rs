// Launcher argument vector

use super::layout::NodeLayout;
use crate::domain::{Broker, Node};
use crate::port::LaunchAction;

/// Build the ordered launcher argv for `action` on `node`
///
/// `<action> --suffix= --no-color <name> -Q dq.<name> <layout flags> -- <broker overrides>`
pub fn build_argv(
    action: LaunchAction,
    node: &Node,
    broker: &Broker,
    layout: &NodeLayout,
) -> Vec<String> {
    let mut argv = vec![
        action.as_str().to_string(),
        "--suffix=".to_string(),
        "--no-color".to_string(),
        node.name.clone(),
        "-Q".to_string(),
        node.direct_queue(),
    ];
    argv.extend(layout.default_args(node));
    argv.push("--".to_string());
    argv.extend(broker.launcher_overrides());
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewBroker;

    #[test]
    fn test_argv_order() {
        let broker = NewBroker {
            hostname: "mq".to_string(),
            port: 5673,
            userid: "u".to_string(),
            password: "p".to_string(),
            virtual_host: "v".to_string(),
        }
        .into_broker(1);
        let node = Node::new("worker1", 0);

        let argv = build_argv(LaunchAction::Restart, &node, &broker, &NodeLayout::default());

        assert_eq!(argv[0], "restart");
        assert_eq!(argv[3], "worker1");
        assert_eq!(&argv[4..6], &["-Q", "dq.worker1"]);
        assert!(argv.contains(&"--autoscale=1,1".to_string()));

        let sep = argv.iter().position(|a| a == "--").unwrap();
        assert_eq!(
            &argv[sep + 1..],
            &[
                "broker.host=mq",
                "broker.port=5673",
                "broker.user=u",
                "broker.password=p",
                "broker.vhost=v",
            ]
        );
    }
}
