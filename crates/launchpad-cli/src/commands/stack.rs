use std::fmt::Write as _;

use launchpad_provision::{ChangeAction, ChangeSet, Provisioner, StackInputs, plan_stack};

use super::Workspace;

pub fn plan(ws: &Workspace) -> anyhow::Result<ChangeSet> {
    let inputs = StackInputs::from_config(&ws.config)?;
    let plan = plan_stack(&inputs)?;
    let changes = Provisioner::new(ws.open_state()?).plan(&inputs.stack, &plan.graph)?;

    println!("Stack {} ({})", inputs.stack, inputs.topology.label());
    print!("{}", render(&changes));
    Ok(changes)
}

pub fn apply(ws: &Workspace) -> anyhow::Result<usize> {
    let inputs = StackInputs::from_config(&ws.config)?;
    let plan = plan_stack(&inputs)?;
    let report = Provisioner::new(ws.open_state()?).apply(&inputs.stack, &plan.graph)?;

    print!("{}", render(&report.changes));
    if report.applied == 0 {
        println!("✓ Stack {} is up to date", inputs.stack);
    } else {
        println!("✓ Applied {} change(s) to {}", report.applied, inputs.stack);
    }
    println!("  Deployment target: {}", plan.target);
    Ok(report.applied)
}

/// One line per resource plus a summary line.
pub fn render(changes: &ChangeSet) -> String {
    let mut out = String::new();
    for change in changes.changes.iter().filter(|c| c.action != ChangeAction::Unchanged) {
        let _ = writeln!(out, "  {} {} ({})", change.action, change.name, change.kind.as_str());
    }
    let _ = writeln!(
        out,
        "{} to create, {} to update, {} to delete, {} unchanged",
        changes.count(ChangeAction::Create),
        changes.count(ChangeAction::Update),
        changes.count(ChangeAction::Delete),
        changes.count(ChangeAction::Unchanged),
    );
    out
}
