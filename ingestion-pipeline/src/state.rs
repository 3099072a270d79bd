use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Processing,
    states: [Processing, Reading, Chunking, Embedding, Entities, Neo4j, Indexed, Failed],
    events {
        read { transition: { from: Processing, to: Reading } }
        chunk { transition: { from: Reading, to: Chunking } }
        embed { transition: { from: Chunking, to: Embedding } }
        extract_entities { transition: { from: Embedding, to: Entities } }
        link_graph { transition: { from: Entities, to: Neo4j } }
        finalize { transition: { from: Neo4j, to: Indexed } }
        abort {
            transition: { from: Processing, to: Failed }
            transition: { from: Reading, to: Failed }
            transition: { from: Chunking, to: Failed }
            transition: { from: Embedding, to: Failed }
            transition: { from: Entities, to: Failed }
            transition: { from: Neo4j, to: Failed }
        }
    }
}

pub fn processing() -> IngestionMachine<(), Processing> {
    IngestionMachine::new(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_indexed() {
        let machine = processing();
        let machine = machine.read().map_err(|(_, g)| g).expect("read");
        let machine = machine.chunk().map_err(|(_, g)| g).expect("chunk");
        let machine = machine.embed().map_err(|(_, g)| g).expect("embed");
        let machine = machine
            .extract_entities()
            .map_err(|(_, g)| g)
            .expect("extract_entities");
        let machine = machine.link_graph().map_err(|(_, g)| g).expect("link_graph");
        let _machine = machine.finalize().map_err(|(_, g)| g).expect("finalize");
    }

    #[test]
    fn abort_is_reachable_from_every_non_terminal_state() {
        let machine = processing();
        let _failed = machine.abort().map_err(|(_, g)| g).expect("abort from processing");

        let machine = processing().read().map_err(|(_, g)| g).expect("read");
        let _failed = machine.abort().map_err(|(_, g)| g).expect("abort from reading");
    }
}
