#![allow(dead_code)]
//! Shared fixtures for the integration suites: a small game-flavored type
//! hierarchy with replicated fields at every level.

use syncweave::{weave_module, CollectingSink, DefaultAttributeOracle, DefaultCodecProvider};
use syncweave_core::WeaveReport;
use syncweave_ir::{
    Attribute, AttrValue, CodeUnit, FieldDef, FieldRef, MethodDef, MethodKind, ModuleImage,
    NativeKind, Op, TypeDef, TypeId, TypeSig,
};

pub const VARIABLE_ATTR: &str = "Replicated";
pub const OBJECT_ATTR: &str = "ReplicatedObject";

pub struct Hierarchy {
    pub image: ModuleImage,
    pub actor: TypeId,
    pub player: TypeId,
    pub mage: TypeId,
}

/// Actor { hp } <- Player { mp } <- Mage { score }, every field replicated.
/// Actor also declares a change-hook for `hp` that records its arguments.
pub fn hierarchy() -> Hierarchy {
    let mut image = ModuleImage::default();

    // Actor lands at type id 0; the hook body's field refs rely on that.
    let mut actor = actor_typedef();
    let mut hp = FieldDef::new("hp", TypeSig::U64);
    hp.attrs.push(
        Attribute::new(VARIABLE_ATTR).with_arg("hook", AttrValue::Str("on_hp_changed".into())),
    );
    actor.add_field(hp).unwrap();
    let actor = image.add_type(actor);

    let mut player = TypeDef::new("Player");
    player.base = Some(actor);
    let mut mp = FieldDef::new("mp", TypeSig::U64);
    mp.attrs.push(Attribute::new(VARIABLE_ATTR));
    player.add_field(mp).unwrap();
    let player = image.add_type(player);

    let mut mage = TypeDef::new("Mage");
    mage.base = Some(player);
    let mut score = FieldDef::new("score", TypeSig::U64);
    score.attrs.push(Attribute::new(VARIABLE_ATTR));
    mage.add_field(score).unwrap();
    let mage = image.add_type(mage);

    Hierarchy {
        image,
        actor,
        player,
        mage,
    }
}

fn actor_typedef() -> TypeDef {
    let mut actor = TypeDef::new("Actor");
    for (name, sig) in [
        ("last_prev", TypeSig::U64),
        ("last_new", TypeSig::U64),
        ("last_auth", TypeSig::Bool),
    ] {
        actor.add_field(FieldDef::new(name, sig)).unwrap();
    }
    let mut hook = MethodDef::new("on_hp_changed", MethodKind::Plain);
    hook.params = vec![TypeSig::U64, TypeSig::U64, TypeSig::Bool];
    hook.is_virtual = true;
    hook.body = Some(CodeUnit::new(vec![
        Op::LdSelf,
        Op::LdArg(0),
        Op::StField(FieldRef::new(0, "last_prev")),
        Op::LdSelf,
        Op::LdArg(1),
        Op::StField(FieldRef::new(0, "last_new")),
        Op::LdSelf,
        Op::LdArg(2),
        Op::StField(FieldRef::new(0, "last_auth")),
        Op::Ret,
    ]));
    actor.add_method(hook).unwrap();
    actor
}

pub struct ObjectFixture {
    pub image: ModuleImage,
    pub owner: TypeId,
    pub list: TypeId,
}

/// Owner declaring a final `SyncList<u64>` field; the list type inherits the
/// object-replication capability from a native base and declares a list
/// container shape.
pub fn object_fixture() -> ObjectFixture {
    let mut image = ModuleImage::default();

    let mut base = TypeDef::new("SyncObject");
    let mut init = MethodDef::new("initialize", MethodKind::Plain);
    init.params = vec![
        TypeSig::U64,
        TypeSig::U64,
        TypeSig::U64,
        TypeSig::U64,
        TypeSig::Bool,
    ];
    init.is_virtual = true;
    init.native = Some(NativeKind::ObjectInitialize);
    init.body = None;
    base.add_method(init).unwrap();
    let mut set_index = MethodDef::new("set_index", MethodKind::Plain);
    set_index.params = vec![TypeSig::Object, TypeSig::U64];
    set_index.is_virtual = true;
    set_index.native = Some(NativeKind::ObjectSetIndex);
    set_index.body = None;
    base.add_method(set_index).unwrap();
    let base = image.add_type(base);

    let mut list = TypeDef::new("SyncList");
    list.base = Some(base);
    list.type_params = 1;
    list.attrs.push(
        Attribute::new("ContainerShape").with_arg("shape", AttrValue::Str("list".into())),
    );
    let list = image.add_type(list);

    let owner = image.add_type(TypeDef::new("Actor"));
    let actor = image.type_at_mut(owner).unwrap();
    let mut items = FieldDef::new("items", TypeSig::Named(list, vec![TypeSig::U64]));
    items.is_final = true;
    items.attrs.push(Attribute::new(OBJECT_ATTR));
    actor.add_field(items).unwrap();
    // the field holds its instance before replication setup runs
    let mut spawn = MethodDef::new("on_spawn", MethodKind::EarlyInit);
    spawn.body = Some(CodeUnit::new(vec![
        Op::LdSelf,
        Op::NewObj(list),
        Op::StField(FieldRef::new(owner, "items")),
        Op::Ret,
    ]));
    actor.add_method(spawn).unwrap();

    ObjectFixture { image, owner, list }
}

/// Run the weave pass with the default collaborators.
pub fn weave(image: &mut ModuleImage) -> (WeaveReport, CollectingSink) {
    let mut sink = CollectingSink::new();
    let report = weave_module(
        image,
        &DefaultCodecProvider,
        &DefaultAttributeOracle,
        &mut sink,
    )
    .unwrap();
    (report, sink)
}
