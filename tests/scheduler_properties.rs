// tests/scheduler_properties.rs

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use gridrun::dag::{Scheduler, TaskNode, TaskRunState, assemble};
use gridrun::engine::TaskOutcome;
use gridrun_test_utils::builders::TaskNodeBuilder;

// Acyclic by construction: task N may only consume outputs of tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<TaskNode>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..3),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let mut b = TaskNodeBuilder::new(&format!("task_{i}"))
                        .target(&format!("/out/{i}"));
                    if i > 0 {
                        let deps: HashSet<usize> = potential.into_iter().map(|d| d % i).collect();
                        for d in deps {
                            b = b.dep(&format!("/out/{d}"));
                        }
                    }
                    b.build()
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn every_task_terminates_and_respects_dependencies(
        tasks in dag_strategy(12),
        failing_idx in proptest::collection::vec(0..12usize, 0..4),
    ) {
        let deps: HashMap<String, Vec<String>> = {
            let (graph, _) = assemble(tasks.clone()).unwrap();
            tasks
                .iter()
                .map(|t| (t.name().to_string(), graph.dependencies_of(t.name())))
                .collect()
        };
        let failing: HashSet<String> = failing_idx
            .into_iter()
            .filter(|&i| i < tasks.len())
            .map(|i| format!("task_{i}"))
            .collect();

        let (graph, _) = assemble(tasks.clone()).unwrap();
        let mut scheduler = Scheduler::new(graph);
        let mut executing: Vec<String> = scheduler.start().into_iter().map(|t| t.name).collect();
        let mut finished: HashSet<String> = HashSet::new();

        let mut steps = 0;
        while let Some(task) = executing.pop() {
            steps += 1;
            prop_assert!(steps <= 1000, "scheduler did not converge");

            for dep in &deps[&task] {
                prop_assert!(finished.contains(dep), "{} ran before {}", task, dep);
                prop_assert_eq!(scheduler.run_state_of(dep), Some(TaskRunState::Completed));
            }

            let outcome = if failing.contains(&task) {
                TaskOutcome::Failed("injected".to_string())
            } else {
                finished.insert(task.clone());
                TaskOutcome::Success
            };
            for next in scheduler.handle_completion(&task, outcome) {
                executing.push(next.name);
            }
        }

        prop_assert!(scheduler.is_finished());
        let summary = scheduler.summary();
        prop_assert_eq!(
            summary.completed.len() + summary.failed.len() + summary.withheld.len(),
            tasks.len()
        );
        if failing.is_empty() {
            prop_assert!(summary.is_success());
        }

        // A withheld task always has a failed or withheld dependency.
        for name in &summary.withheld {
            let blocked = deps[name].iter().any(|d| {
                matches!(
                    scheduler.run_state_of(d),
                    Some(TaskRunState::Failed) | Some(TaskRunState::Withheld)
                )
            });
            prop_assert!(blocked, "{} withheld without a failed dependency", name);
        }
    }
}

proptest! {
    #[test]
    fn disjoint_artifacts_hang_every_task_off_the_root(n in 1usize..20) {
        let tasks: Vec<TaskNode> = (0..n)
            .map(|i| {
                TaskNodeBuilder::new(&format!("t{i}"))
                    .target(&format!("/own/{i}.out"))
                    .dep(&format!("/input/{i}.in"))
                    .build()
            })
            .collect();

        let (graph, _) = assemble(tasks).unwrap();
        prop_assert_eq!(graph.task_count(), n);
        prop_assert_eq!(graph.edge_count(), n);
        for i in 0..n {
            let name = format!("t{i}");
            prop_assert!(graph.is_root_child(&name));
        }
    }
}
